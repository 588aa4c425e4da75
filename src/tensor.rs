use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::shape::{display_comma, Shape};

/// Logical element type of a tensor. Storage is uniformly f32; the tag
/// records what the values mean (bools are 0.0/1.0, integers are whole
/// floats). This mirrors how the interchange format types survive the
/// trip through the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataType {
    Float,
    Double,
    Half,
    Int,
    Long,
    Short,
    Char,
    Uint,
    Ulong,
    Ushort,
    Uchar,
    Bool,
}

impl DataType {
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double | DataType::Half)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Half => "half",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Short => "short",
            DataType::Char => "char",
            DataType::Uint => "uint",
            DataType::Ulong => "ulong",
            DataType::Ushort => "ushort",
            DataType::Uchar => "uchar",
            DataType::Bool => "bool",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TensorDesc {
    pub shape: Shape,
    pub data_type: DataType,
}

impl TensorDesc {
    pub fn new(extents: &[usize], data_type: DataType) -> Self {
        TensorDesc {
            shape: Shape::new(extents),
            data_type,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn extents(&self) -> &[usize] {
        self.shape.extents()
    }

    pub fn rank(&self) -> usize {
        self.shape.num_axes()
    }

    pub fn size(&self) -> usize {
        self.shape.size()
    }
}

impl Debug for TensorDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.data_type, display_comma(self.extents()))
    }
}

/// Eager, host-resident tensor. Views created by layout operations share
/// the backing buffer; compute primitives materialize as needed.
#[derive(Clone)]
pub struct Tensor {
    pub desc: TensorDesc,
    data: Arc<Vec<f32>>,
}

impl Tensor {
    // ******************************** Constructors ******************************** //

    pub fn new<D>(data: D) -> Self
    where
        D: DataLiteral,
    {
        let extents = data.extents();
        Tensor {
            desc: TensorDesc::new(&extents, DataType::Float),
            data: Arc::new(data.to_vec()),
        }
    }

    pub fn from_vec(extents: &[usize], vec: Vec<f32>) -> Self {
        assert_eq!(extents.iter().product::<usize>(), vec.len());
        Tensor {
            desc: TensorDesc::new(extents, DataType::Float),
            data: Arc::new(vec),
        }
    }

    pub fn from_iter<I>(extents: &[usize], iter: I) -> Self
    where
        I: Iterator<Item = f32>,
    {
        Tensor::from_vec(extents, iter.collect())
    }

    pub fn from_scalar(extents: &[usize], val: f32) -> Self {
        let size = extents.iter().product();
        Tensor::from_vec(extents, vec![val; size])
    }

    pub fn zeros(extents: &[usize]) -> Self {
        Tensor::from_scalar(extents, 0.0)
    }

    pub fn ones(extents: &[usize]) -> Self {
        Tensor::from_scalar(extents, 1.0)
    }

    pub fn scalar(val: f32) -> Self {
        Tensor::from_vec(&[], vec![val])
    }

    /// Re-tags the logical element type without touching values.
    pub fn as_type(&self, data_type: DataType) -> Tensor {
        Tensor {
            desc: TensorDesc {
                shape: self.desc.shape.clone(),
                data_type,
            },
            data: self.data.clone(),
        }
    }

    // ******************************** Getters ******************************** //

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn data_type(&self) -> DataType {
        self.desc.data_type()
    }

    pub fn extents(&self) -> &[usize] {
        self.desc.extents()
    }

    pub fn extent(&self, axis: usize) -> usize {
        self.desc.extents()[axis]
    }

    pub fn shape(&self) -> &Shape {
        self.desc.shape()
    }

    pub fn rank(&self) -> usize {
        self.desc.rank()
    }

    pub fn size(&self) -> usize {
        self.desc.size()
    }

    pub fn buffer(&self) -> &[f32] {
        &self.data
    }

    // ******************************** Element access ******************************** //

    /// Values in logical (row-major) order, following strides.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.shape().iter().map(move |i| self.data[i])
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }

    pub fn scalar_value(&self) -> f32 {
        self.data[self.shape().translate_default(0)]
    }

    pub fn at(&self, index: &[usize]) -> f32 {
        debug_assert_eq!(index.len(), self.rank());
        let flat = index
            .iter()
            .zip(self.shape().strides())
            .map(|(i, s)| i * s)
            .sum::<usize>()
            + self.shape().offset();
        self.data[flat]
    }

    // ******************************** Tests ******************************** //

    pub fn all_close(t1: &Tensor, t2: &Tensor, eps: f32) -> bool {
        t1.extents() == t2.extents()
            && t1
                .iter()
                .zip(t2.iter())
                .all(|(v1, v2)| (v1 - v2).abs() < eps || (v1.is_nan() && v2.is_nan()))
    }

    pub fn all_equal(t1: &Tensor, t2: &Tensor) -> bool {
        t1.extents() == t2.extents() && t1.iter().zip(t2.iter()).all(|(v1, v2)| v1 == v2)
    }

    // ******************************** Memory layout ******************************** //

    fn with_layout(&self, layout: Shape) -> Tensor {
        Tensor {
            desc: TensorDesc {
                shape: layout,
                data_type: self.data_type(),
            },
            data: self.data.clone(),
        }
    }

    /// Copies into a fresh buffer with default strides.
    pub fn contiguous(&self) -> Tensor {
        if self.shape().has_default_strides() {
            self.clone()
        } else {
            Tensor {
                desc: TensorDesc::new(self.extents(), self.data_type()),
                data: Arc::new(self.to_vec()),
            }
        }
    }

    /// Reinterprets under new extents (same element count, row-major order).
    pub fn view(&self, extents: &[usize]) -> Tensor {
        assert_eq!(extents.iter().product::<usize>(), self.size());
        let base = self.contiguous();
        base.with_layout(Shape::new(extents))
    }

    pub fn squeeze_axis(&self, axis: usize) -> Tensor {
        if self.extents()[axis] != 1 {
            panic!("only size=1 axes can be squeezed");
        }
        self.with_layout(self.shape().remove(axis))
    }

    pub fn expand_axis(&self, axis: usize) -> Tensor {
        // insertion at rank() appends a trailing axis
        assert!(axis <= self.rank());
        self.with_layout(self.shape().insert(axis))
    }

    pub fn transpose(&self, axis1: usize, axis2: usize) -> Tensor {
        self.with_layout(self.shape().swap(axis1, axis2))
    }

    pub fn permute(&self, axes: &[usize]) -> Tensor {
        let mut use_counts = vec![0; self.rank()];
        axes.iter().for_each(|axis| {
            use_counts[*axis] += 1;
        });
        if use_counts.iter().any(|count| *count != 1) {
            panic!("some axes are not used, or used more than once");
        }
        self.with_layout(self.shape().permute(axes))
    }

    pub fn expand(&self, extents: &[usize]) -> Tensor {
        self.with_layout(self.shape().expand(extents))
    }

    // ******************************** Indexing operations ******************************** //

    pub fn index(&self, index: usize, axis: usize) -> Tensor {
        if self.extents()[axis] <= index {
            panic!("index out of bounds");
        }
        self.with_layout(self.shape().select(index, axis))
    }

    /// Half-open slice along one axis; empty slices are allowed.
    pub fn slice(&self, start: usize, end: usize, axis: usize) -> Tensor {
        if self.extents()[axis] < end {
            panic!("index out of bounds");
        }
        self.with_layout(self.shape().select_range(start, end, axis))
    }
}

impl Debug for Tensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "tensor.{:?}", self.desc)
    }
}

impl AsRef<Tensor> for Tensor {
    fn as_ref(&self) -> &Tensor {
        self
    }
}

/// Nested-array literals for tensor construction in tests and constants.
pub trait DataLiteral {
    fn flat<'a>(&'a self) -> Box<dyn Iterator<Item = f32> + 'a>;
    fn extents(&self) -> Vec<usize>;

    fn to_vec(&self) -> Vec<f32> {
        self.flat().collect()
    }
}

impl DataLiteral for f32 {
    fn flat(&self) -> Box<dyn Iterator<Item = f32>> {
        Box::new(core::iter::once(*self))
    }

    fn extents(&self) -> Vec<usize> {
        Vec::new()
    }
}

impl<E, const C: usize> DataLiteral for [E; C]
where
    E: DataLiteral,
{
    fn flat<'a>(&'a self) -> Box<dyn Iterator<Item = f32> + 'a> {
        Box::new(self.iter().flat_map(|a| a.flat()))
    }

    fn extents(&self) -> Vec<usize> {
        let mut s = self[0].extents();
        s.insert(0, self.len());
        s
    }
}

impl<'a, E> DataLiteral for &'a [E]
where
    E: DataLiteral,
{
    fn flat<'b>(&'b self) -> Box<dyn Iterator<Item = f32> + 'b> {
        Box::new(self.iter().flat_map(|a| a.flat()))
    }

    fn extents(&self) -> Vec<usize> {
        let mut s = self[0].extents();
        s.insert(0, self.len());
        s
    }
}

impl<E> DataLiteral for Vec<E>
where
    E: DataLiteral,
{
    fn flat<'b>(&'b self) -> Box<dyn Iterator<Item = f32> + 'b> {
        Box::new(self.iter().flat_map(|a| a.flat()))
    }

    fn extents(&self) -> Vec<usize> {
        let mut s = self[0].extents();
        s.insert(0, self.len());
        s
    }
}
