use crate::layout::DataFormat;
use crate::shape::{increment_index, Shape};
use crate::tensor::Tensor;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PadMode {
    Constant(f32),
    Reflect,
    Edge,
}

/// Materializes a tensor by evaluating `f` at every output position in
/// row-major order.
pub fn build<F>(extents: &[usize], f: F) -> Tensor
where
    F: Fn(&[usize]) -> f32,
{
    let size: usize = extents.iter().product();
    let mut data = Vec::with_capacity(size);
    let mut index = vec![0; extents.len()];
    for _ in 0..size {
        data.push(f(&index));
        increment_index(&mut index, extents);
    }
    Tensor::from_vec(extents, data)
}

pub fn concat(xs: &[Tensor], axis: usize) -> Tensor {
    assert!(!xs.is_empty());
    let mut extents = xs[0].extents().to_vec();
    extents[axis] = xs.iter().map(|x| x.extent(axis)).sum();

    let out_size: usize = extents.iter().product();
    let out_strides = Shape::default_strides(&extents);
    let mut data = vec![0.0; out_size];

    let mut base = 0;
    for x in xs {
        let mut index = vec![0; x.rank()];
        for v in x.iter() {
            let flat = base * out_strides[axis]
                + index
                    .iter()
                    .zip(out_strides.iter())
                    .map(|(i, s)| i * s)
                    .sum::<usize>();
            data[flat] = v;
            increment_index(&mut index, x.extents());
        }
        base += x.extent(axis);
    }

    Tensor::from_vec(&extents, data).as_type(xs[0].data_type())
}

/// Stacks like-shaped tensors along a fresh axis.
pub fn stack(xs: &[Tensor], axis: usize) -> Tensor {
    let expanded: Vec<Tensor> = xs.iter().map(|x| x.expand_axis(axis)).collect();
    concat(&expanded, axis)
}

pub fn split(x: &Tensor, sizes: &[usize], axis: usize) -> Vec<Tensor> {
    assert_eq!(sizes.iter().sum::<usize>(), x.extent(axis));
    let mut out = Vec::with_capacity(sizes.len());
    let mut start = 0;
    for &size in sizes {
        out.push(x.slice(start, start + size, axis).contiguous());
        start += size;
    }
    out
}

pub fn split_equal(x: &Tensor, parts: usize, axis: usize) -> Vec<Tensor> {
    assert_eq!(x.extent(axis) % parts, 0);
    let sizes = vec![x.extent(axis) / parts; parts];
    split(x, &sizes, axis)
}

pub fn tile(x: &Tensor, multiples: &[usize]) -> Tensor {
    let extents: Vec<usize> = x
        .extents()
        .iter()
        .zip(multiples)
        .map(|(e, m)| e * m)
        .collect();
    let src = x.extents().to_vec();
    build(&extents, |index| {
        let inner: Vec<usize> = index.iter().zip(&src).map(|(i, e)| i % e).collect();
        x.at(&inner)
    })
    .as_type(x.data_type())
}

pub fn reverse(x: &Tensor, axis: usize) -> Tensor {
    let extents = x.extents().to_vec();
    let n = extents[axis];
    build(&extents, |index| {
        let mut src = index.to_vec();
        src[axis] = n - 1 - src[axis];
        x.at(&src)
    })
    .as_type(x.data_type())
}

/// Per-axis (before, after) padding.
pub fn pad(x: &Tensor, pads: &[(usize, usize)], mode: PadMode) -> Tensor {
    assert_eq!(pads.len(), x.rank());
    let src = x.extents().to_vec();
    let extents: Vec<usize> = src
        .iter()
        .zip(pads)
        .map(|(e, (lo, hi))| e + lo + hi)
        .collect();

    build(&extents, |index| {
        let mut inner = Vec::with_capacity(index.len());
        for (a, &i) in index.iter().enumerate() {
            let (lo, _) = pads[a];
            let e = src[a] as isize;
            let p = i as isize - lo as isize;
            let p = match mode {
                PadMode::Constant(value) => {
                    if p < 0 || p >= e {
                        return value;
                    }
                    p
                }
                PadMode::Edge => p.clamp(0, e - 1),
                PadMode::Reflect => {
                    // mirror without repeating the border element
                    let mut p = p;
                    while p < 0 || p >= e {
                        if p < 0 {
                            p = -p;
                        }
                        if p >= e {
                            p = 2 * (e - 1) - p;
                        }
                    }
                    p
                }
            };
            inner.push(p as usize);
        }
        x.at(&inner)
    })
    .as_type(x.data_type())
}

/// Rearranges depth into spatial blocks (DCR order), rank-4 input.
pub fn depth_to_space(x: &Tensor, block: usize, format: DataFormat) -> Tensor {
    if format == DataFormat::ChannelFirst {
        let y = depth_to_space(&x.permute(&[0, 2, 3, 1]).contiguous(), block, DataFormat::ChannelLast);
        return y.permute(&[0, 3, 1, 2]).contiguous();
    }

    let (b, h, w, c) = (x.extent(0), x.extent(1), x.extent(2), x.extent(3));
    assert_eq!(c % (block * block), 0);
    let c_out = c / (block * block);

    build(&[b, h * block, w * block, c_out], |index| {
        let (n, oh, ow, oc) = (index[0], index[1], index[2], index[3]);
        let ic = ((oh % block) * block + (ow % block)) * c_out + oc;
        x.at(&[n, oh / block, ow / block, ic])
    })
    .as_type(x.data_type())
}

/// Rearranges spatial blocks into depth (inverse of [`depth_to_space`]).
pub fn space_to_depth(x: &Tensor, block: usize, format: DataFormat) -> Tensor {
    if format == DataFormat::ChannelFirst {
        let y = space_to_depth(&x.permute(&[0, 2, 3, 1]).contiguous(), block, DataFormat::ChannelLast);
        return y.permute(&[0, 3, 1, 2]).contiguous();
    }

    let (b, h, w, c) = (x.extent(0), x.extent(1), x.extent(2), x.extent(3));
    assert_eq!(h % block, 0);
    assert_eq!(w % block, 0);

    build(&[b, h / block, w / block, c * block * block], |index| {
        let (n, oh, ow, oc) = (index[0], index[1], index[2], index[3]);
        let ic = oc % c;
        let rem = oc / c;
        let (dh, dw) = (rem / block, rem % block);
        x.at(&[n, oh * block + dh, ow * block + dw, ic])
    })
    .as_type(x.data_type())
}
