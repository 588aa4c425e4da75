use itertools::Itertools;
use smallvec::SmallVec;
use thiserror::Error;

pub type Array = SmallVec<[usize; 5]>;

pub fn display_comma(arr: &[usize]) -> String {
    arr.iter().map(|s| s.to_string()).join(", ")
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ShapeError {
    #[error("size mismatch! expected {} but got {}.", .0, .1)]
    SizeMismatch(usize, usize),

    #[error("cannot infer the size")]
    InvalidInference,

    #[error("invalid shape extent {}, size should be larger than 0 or set to -1 for inference", .0)]
    InvalidExtent(isize),

    #[error("index out of range, expected index in range of {}..{}, but {} is given.", .low, .high, .index)]
    OutOfBounds {
        index: isize,
        low: isize,
        high: isize,
    },

    #[error("invalid index bound")]
    InvalidBound,

    #[error("invalid broadcast")]
    InvalidBroadcast,
}

/// Row-major memory layout of a dense tensor. Strides are in elements,
/// zero strides encode broadcast axes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape {
    pub extents: Array,
    pub strides: Array,
    pub offset: usize,
}

impl Shape {
    pub fn default_strides(extents: &[usize]) -> Array {
        let size = extents.iter().product();
        extents
            .iter()
            .scan(size, |size, extent| {
                *size /= extent;
                Some(*size)
            })
            .collect()
    }

    pub fn new(extents: &[usize]) -> Shape {
        let extents: Array = extents.iter().copied().collect();
        let strides = Self::default_strides(&extents);
        Shape {
            extents,
            strides,
            offset: 0,
        }
    }

    pub fn num_axes(&self) -> usize {
        self.extents.len()
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }

    /// Maps a logical (row-major) element index onto the backing buffer.
    pub fn translate_default(&self, index: usize) -> usize {
        let mut out_index = self.offset;
        let mut p = self.size();
        let mut rem = index;
        for i in 0..self.extents.len() {
            p /= self.extents[i];
            let c = rem / p;
            rem -= c * p;
            out_index += c * self.strides[i];
        }
        out_index
    }

    pub fn has_default_strides(&self) -> bool {
        self.offset == 0
            && self
                .extents
                .iter()
                .scan(self.size(), |size, extent| {
                    *size /= extent;
                    Some(*size)
                })
                .zip(self.strides.iter())
                .all(|(s1, s2)| s1 == *s2)
    }

    pub fn remove(&self, axis: usize) -> Shape {
        let mut shape = self.clone();
        shape.extents.remove(axis);
        shape.strides.remove(axis);
        shape
    }

    pub fn insert(&self, axis: usize) -> Shape {
        let mut shape = self.clone();
        shape.extents.insert(axis, 1);
        shape.strides.insert(axis, 0);
        shape
    }

    pub fn swap(&self, axis1: usize, axis2: usize) -> Shape {
        let mut shape = self.clone();
        shape.extents.swap(axis1, axis2);
        shape.strides.swap(axis1, axis2);
        shape
    }

    pub fn permute(&self, axes: &[usize]) -> Shape {
        let (new_extents, new_strides) = axes
            .iter()
            .map(|axis| (self.extents[*axis], self.strides[*axis]))
            .unzip();
        Shape {
            extents: new_extents,
            strides: new_strides,
            offset: self.offset,
        }
    }

    pub fn select(&self, index: usize, axis: usize) -> Shape {
        if self.num_axes() <= axis {
            panic!("axis out of bounds");
        }
        if self.extents[axis] <= index {
            panic!("index out of bounds");
        }
        let mut shape = self.clone();
        shape.offset += shape.strides[axis] * index;
        shape.remove(axis)
    }

    /// Half-open range along one axis. Zero-length selections are allowed
    /// (clamped slices can be empty).
    pub fn select_range(&self, start: usize, end: usize, axis: usize) -> Shape {
        if self.extents[axis] < end || end < start {
            panic!("index out of bounds");
        }
        let mut shape = self.clone();
        shape.offset += self.strides[axis] * start;
        shape.extents[axis] = end - start;
        shape
    }

    pub fn expand(&self, extents: &[usize]) -> Shape {
        if extents.len() < self.extents.len() {
            panic!("target shape must be larger than the broadcasted shape");
        }

        let mut new_extents = self.extents.clone();
        let mut new_strides = self.strides.clone();

        // (3, 1, 5) broadcast to (2, 1, 3, 9, 5):
        // left-pad to (1, 1, 3, 1, 5), then mute size-1 axes.
        for _ in 0..(extents.len() - self.extents.len()) {
            new_extents.insert(0, 1);
            new_strides.insert(0, 0);
        }

        for ((new_extent, extent), new_stride) in new_extents
            .iter_mut()
            .zip(extents.iter())
            .zip(new_strides.iter_mut())
        {
            if *new_extent != *extent {
                if *new_extent == 1 {
                    *new_extent = *extent;
                    *new_stride = 0;
                } else {
                    panic!("invalid broadcast... target shape should be larger.");
                }
            }
        }

        Shape {
            extents: new_extents,
            strides: new_strides,
            offset: self.offset,
        }
    }

    pub fn iter(&self) -> IndexIter {
        IndexIter::new(self)
    }
}

pub struct IndexIter {
    shape: Shape,
    index: usize,
    len: usize,
}

impl IndexIter {
    pub fn new(layout: &Shape) -> Self {
        IndexIter {
            shape: layout.clone(),
            index: 0,
            len: layout.size(),
        }
    }
}

impl Iterator for IndexIter {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.len {
            let t_index = self.shape.translate_default(self.index);
            self.index += 1;
            Some(t_index)
        } else {
            None
        }
    }
}

impl ExactSizeIterator for IndexIter {
    fn len(&self) -> usize {
        self.len - self.index
    }
}

/// Advances a multi-index one step in row-major order, wrapping at the end.
pub fn increment_index(index: &mut [usize], extents: &[usize]) {
    for a in (0..extents.len()).rev() {
        index[a] += 1;
        if index[a] < extents[a] {
            return;
        }
        index[a] = 0;
    }
}

/// Numpy-style broadcast union of two extents.
pub fn union(shape1: &[usize], shape2: &[usize]) -> Result<Array, ShapeError> {
    let shape1: Array = shape1.iter().copied().collect();
    let shape2: Array = shape2.iter().copied().collect();

    if shape1 == shape2 {
        Ok(shape1)
    } else {
        let (longer, shorter) = if shape1.len() > shape2.len() {
            (shape1, shape2)
        } else {
            (shape2, shape1)
        };

        let len = longer.len() - shorter.len();
        let mut u = shorter;

        for i in 0..len {
            u.insert(i, longer[i]);
        }

        for (a, b) in u.iter_mut().zip(longer.iter()) {
            if *a != *b {
                if *a == 1 {
                    *a = *b;
                } else if *b != 1 {
                    return Err(ShapeError::InvalidBroadcast);
                }
            }
        }
        Ok(u)
    }
}

/// Normalizes a possibly-negative axis against the given rank.
pub fn axis_to_usize(axis: isize, bound: usize) -> Result<usize, ShapeError> {
    if bound < 1 {
        return Err(ShapeError::InvalidBound);
    }
    let a = if axis >= 0 { axis } else { axis + bound as isize };
    if 0 <= a && (a as usize) < bound {
        Ok(a as usize)
    } else {
        Err(ShapeError::OutOfBounds {
            index: axis,
            low: -(bound as isize),
            high: (bound - 1) as isize,
        })
    }
}

pub fn axes_to_arr(axes: &[isize], bound: usize) -> Result<Array, ShapeError> {
    axes.iter().map(|i| axis_to_usize(*i, bound)).try_collect()
}

/// Resolves target extents that may carry a single -1 inference slot
/// against a known element count.
pub fn infer_extents(extents: &[isize], size: usize) -> Result<Array, ShapeError> {
    let mut use_infer = false;
    let mut infer_idx = 0;

    let mut expected_size = 1;
    let mut vec = Array::with_capacity(extents.len());

    for (i, extent) in extents.iter().enumerate() {
        if *extent == -1 {
            if !use_infer {
                use_infer = true;
                infer_idx = i;
            } else {
                return Err(ShapeError::InvalidInference);
            }
        } else if *extent > 0 {
            vec.push(*extent as usize);
            expected_size *= *extent as usize;
        } else {
            return Err(ShapeError::InvalidExtent(*extent));
        }
    }

    if !use_infer && expected_size != size && size > 0 {
        return Err(ShapeError::SizeMismatch(size, expected_size));
    }

    if use_infer && (size == 0 || size % expected_size != 0) {
        return Err(ShapeError::InvalidInference);
    }
    if use_infer {
        vec.insert(infer_idx, size / expected_size);
    }
    Ok(vec)
}
