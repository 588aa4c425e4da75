use crate::layout::{perm_between, DataFormat};
use crate::shape::increment_index;
use crate::tensor::Tensor;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PoolKind {
    Avg,
    Max,
}

/// Native padding modes. SAME pads symmetrically, placing the extra
/// element at the end of an axis; "pad more at the start" has no native
/// expression and routes through the portable fallback instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Padding {
    Same,
    Valid,
}

/// N-dimensional pooling. Averages count only in-bounds elements, so SAME
/// windows hanging off the edge stay unbiased.
pub fn pool(
    x: &Tensor,
    kernel: &[usize],
    strides: &[usize],
    padding: Padding,
    kind: PoolKind,
    format: DataFormat,
) -> Tensor {
    if format == DataFormat::ChannelFirst {
        let rank = x.rank();
        let to = perm_between(DataFormat::ChannelFirst, DataFormat::ChannelLast, rank);
        let from = perm_between(DataFormat::ChannelLast, DataFormat::ChannelFirst, rank);
        let y = pool(
            &x.permute(&to).contiguous(),
            kernel,
            strides,
            padding,
            kind,
            DataFormat::ChannelLast,
        );
        return y.permute(&from).contiguous();
    }

    let rank = x.rank();
    let spatial = rank - 2;
    assert_eq!(kernel.len(), spatial);
    assert_eq!(strides.len(), spatial);

    let batch = x.extent(0);
    let channels = x.extent(rank - 1);
    let in_spatial: Vec<usize> = x.extents()[1..rank - 1].to_vec();

    let mut out_spatial = Vec::with_capacity(spatial);
    let mut begin_pads = Vec::with_capacity(spatial);
    for i in 0..spatial {
        match padding {
            Padding::Same => {
                let out = (in_spatial[i] + strides[i] - 1) / strides[i];
                let total =
                    ((out - 1) * strides[i] + kernel[i]).saturating_sub(in_spatial[i]);
                out_spatial.push(out);
                begin_pads.push(total / 2);
            }
            Padding::Valid => {
                out_spatial.push((in_spatial[i] - kernel[i]) / strides[i] + 1);
                begin_pads.push(0);
            }
        }
    }

    let mut out_extents = vec![batch];
    out_extents.extend(out_spatial.iter());
    out_extents.push(channels);
    let out_size: usize = out_extents.iter().product();

    let kernel_size: usize = kernel.iter().product();
    let mut out = Vec::with_capacity(out_size);
    let mut index = vec![0; rank];

    for _ in 0..out_size {
        let mut acc = match kind {
            PoolKind::Avg => 0.0,
            PoolKind::Max => f32::NEG_INFINITY,
        };
        let mut count = 0;

        let mut k_pos = vec![0; spatial];
        for _ in 0..kernel_size {
            let mut src = Vec::with_capacity(rank);
            src.push(index[0]);
            let mut in_bounds = true;
            for i in 0..spatial {
                let p = index[1 + i] * strides[i] + k_pos[i];
                let p = p as isize - begin_pads[i] as isize;
                if p < 0 || p >= in_spatial[i] as isize {
                    in_bounds = false;
                    break;
                }
                src.push(p as usize);
            }
            if in_bounds {
                src.push(index[rank - 1]);
                let v = x.at(&src);
                acc = match kind {
                    PoolKind::Avg => acc + v,
                    PoolKind::Max => acc.max(v),
                };
                count += 1;
            }
            increment_index(&mut k_pos, kernel);
        }

        out.push(match kind {
            PoolKind::Avg => acc / count as f32,
            PoolKind::Max => acc,
        });
        increment_index(&mut index, &out_extents);
    }

    Tensor::from_vec(&out_extents, out).as_type(x.data_type())
}
