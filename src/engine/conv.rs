use rayon::prelude::*;

use crate::layout::{perm_between, DataFormat};
use crate::shape::ShapeError;
use crate::tensor::Tensor;

/// N-dimensional convolution, VALID padding only; padding policy lives in
/// the lowering rules, which pre-pad explicitly.
///
/// Weights follow the engine convention: spatial axes first, then input
/// channels, then output channels.
pub fn convolution(
    x: &Tensor,
    w: &Tensor,
    strides: &[usize],
    dilations: &[usize],
    format: DataFormat,
) -> Result<Tensor, ShapeError> {
    if format == DataFormat::ChannelFirst {
        let rank = x.rank();
        let to = perm_between(DataFormat::ChannelFirst, DataFormat::ChannelLast, rank);
        let from = perm_between(DataFormat::ChannelLast, DataFormat::ChannelFirst, rank);
        let y = convolution(
            &x.permute(&to).contiguous(),
            w,
            strides,
            dilations,
            DataFormat::ChannelLast,
        )?;
        return Ok(y.permute(&from).contiguous());
    }

    let rank = x.rank();
    let spatial = rank - 2;
    assert_eq!(w.rank(), spatial + 2);
    assert_eq!(strides.len(), spatial);
    assert_eq!(dilations.len(), spatial);

    let batch = x.extent(0);
    let c_in = x.extent(rank - 1);
    let c_out = w.extent(w.rank() - 1);
    if w.extent(w.rank() - 2) != c_in {
        return Err(ShapeError::SizeMismatch(w.extent(w.rank() - 2), c_in));
    }

    let kernel: Vec<usize> = w.extents()[..spatial].to_vec();
    let in_spatial: Vec<usize> = x.extents()[1..rank - 1].to_vec();

    let mut out_spatial = Vec::with_capacity(spatial);
    for i in 0..spatial {
        let eff = (kernel[i] - 1) * dilations[i] + 1;
        if in_spatial[i] < eff {
            return Err(ShapeError::SizeMismatch(in_spatial[i], eff));
        }
        out_spatial.push((in_spatial[i] - eff) / strides[i] + 1);
    }

    let mut out_extents = vec![batch];
    out_extents.extend(out_spatial.iter());
    out_extents.push(c_out);

    let x = x.contiguous();
    let w = w.contiguous();
    let xv = x.buffer();
    let wv = w.buffer();

    // element strides of the contiguous input and weights
    let mut x_strides = vec![1; rank];
    for i in (0..rank - 1).rev() {
        x_strides[i] = x_strides[i + 1] * x.extents()[i + 1];
    }
    let mut w_strides = vec![1; w.rank()];
    for i in (0..w.rank() - 1).rev() {
        w_strides[i] = w_strides[i + 1] * w.extents()[i + 1];
    }

    let kernel_size: usize = kernel.iter().product();
    let out_rows: usize = out_extents[..rank - 1].iter().product();
    let mut out = vec![0.0; out_rows * c_out];

    out.par_chunks_mut(c_out).enumerate().for_each(|(row, chunk)| {
        // decompose the row id into (batch, out spatial...)
        let mut pos = vec![0; spatial];
        let mut rem = row;
        for i in (0..spatial).rev() {
            pos[i] = rem % out_spatial[i];
            rem /= out_spatial[i];
        }
        let b = rem;

        for k_flat in 0..kernel_size {
            let mut k_pos = vec![0; spatial];
            let mut rem = k_flat;
            for i in (0..spatial).rev() {
                k_pos[i] = rem % kernel[i];
                rem /= kernel[i];
            }

            let mut x_base = b * x_strides[0];
            for i in 0..spatial {
                let p = pos[i] * strides[i] + k_pos[i] * dilations[i];
                x_base += p * x_strides[i + 1];
            }
            let mut w_base = 0;
            for i in 0..spatial {
                w_base += k_pos[i] * w_strides[i];
            }

            for ci in 0..c_in {
                let xval = xv[x_base + ci];
                if xval == 0.0 {
                    continue;
                }
                let wb = w_base + ci * w_strides[w_strides.len() - 2];
                for co in 0..c_out {
                    chunk[co] += xval * wv[wb + co];
                }
            }
        }
    });

    Ok(Tensor::from_vec(&out_extents, out).as_type(x.data_type()))
}

/// Adds a channel vector to every channel row of `x`.
pub fn bias_add(x: &Tensor, bias: &Tensor, format: DataFormat) -> Result<Tensor, ShapeError> {
    assert_eq!(bias.rank(), 1);
    let rank = x.rank();
    let mut shape = vec![1; rank];
    match format {
        DataFormat::ChannelLast => shape[rank - 1] = bias.extent(0),
        DataFormat::ChannelFirst => shape[1] = bias.extent(0),
    }
    crate::engine::map::add(x, &bias.view(&shape))
}
