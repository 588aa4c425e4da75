//! Layout- and padding-agnostic reference pooling.
//!
//! Native pooling cannot express every auto-pad policy (notably padding
//! more at the start of an axis than at the end). This evaluator pads
//! with a NaN sentinel, gathers every kernel window explicitly, and
//! reduces only the real entries. It is a deliberate slow path, invoked
//! solely by the lowering rules that detect such a configuration.

use rayon::prelude::*;

use crate::engine::layout::{pad, PadMode};
use crate::engine::pool::PoolKind;
use crate::shape::increment_index;
use crate::tensor::{DataType, Tensor};

/// Pools a channel-first tensor `x` ([N, C, spatial...]) under explicit
/// per-side pads (`pads` holds the begin amounts for every spatial axis
/// followed by the end amounts, interchange-format style).
///
/// A window that contains no real entries (every element is padding)
/// produces 0.0; see the crate design notes for this policy.
pub fn pool_portable(
    x: &Tensor,
    kernel: &[usize],
    strides: &[usize],
    pads: &[usize],
    out_spatial: &[usize],
    kind: PoolKind,
) -> Tensor {
    let rank = x.rank();
    let spatial = rank - 2;
    assert_eq!(kernel.len(), spatial);
    assert_eq!(strides.len(), spatial);
    assert_eq!(pads.len(), 2 * spatial);
    assert_eq!(out_spatial.len(), spatial);

    let mut pad_pairs = vec![(0, 0); 2];
    pad_pairs.extend((0..spatial).map(|i| (pads[i], pads[i + spatial])));
    let padded = pad(x, &pad_pairs, PadMode::Constant(f32::NAN));

    let mut out_extents = vec![x.extent(0), x.extent(1)];
    out_extents.extend(out_spatial.iter());
    let out_size: usize = out_extents.iter().product();

    let kernel_size: usize = kernel.iter().product();
    let out: Vec<f32> = (0..out_size)
        .into_par_iter()
        .map(|flat| {
            // decompose into (batch, channel, out spatial...)
            let mut pos = vec![0; rank];
            let mut rem = flat;
            for a in (0..rank).rev() {
                pos[a] = rem % out_extents[a];
                rem /= out_extents[a];
            }

            let mut acc = match kind {
                PoolKind::Avg => 0.0,
                PoolKind::Max => f32::NEG_INFINITY,
            };
            let mut count = 0;

            let mut k_pos = vec![0; spatial];
            for _ in 0..kernel_size {
                let mut src = vec![pos[0], pos[1]];
                for i in 0..spatial {
                    src.push(pos[2 + i] * strides[i] + k_pos[i]);
                }
                let v = padded.at(&src);
                if !v.is_nan() {
                    acc = match kind {
                        PoolKind::Avg => acc + v,
                        PoolKind::Max => acc.max(v),
                    };
                    count += 1;
                }
                increment_index(&mut k_pos, kernel);
            }

            if count == 0 {
                0.0
            } else {
                match kind {
                    PoolKind::Avg => acc / count as f32,
                    PoolKind::Max => acc,
                }
            }
        })
        .collect();

    Tensor::from_vec(&out_extents, out).as_type(DataType::Float)
}
