use crate::shape::{union, ShapeError};
use crate::tensor::{DataType, Tensor};

/// Batched matrix product with numpy-style broadcast of the leading axes.
pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor, ShapeError> {
    assert!(a.rank() >= 2 && b.rank() >= 2);

    let (m, ka) = (a.extent(a.rank() - 2), a.extent(a.rank() - 1));
    let (kb, n) = (b.extent(b.rank() - 2), b.extent(b.rank() - 1));
    if ka != kb {
        return Err(ShapeError::SizeMismatch(ka, kb));
    }

    let batch = union(
        &a.extents()[..a.rank() - 2],
        &b.extents()[..b.rank() - 2],
    )?;

    let mut a_ext: Vec<usize> = batch.to_vec();
    a_ext.extend([m, ka]);
    let mut b_ext: Vec<usize> = batch.to_vec();
    b_ext.extend([kb, n]);
    let a = a.expand(&a_ext).contiguous();
    let b = b.expand(&b_ext).contiguous();

    let mut out_extents: Vec<usize> = batch.to_vec();
    out_extents.extend([m, n]);

    let batch_size: usize = batch.iter().product();
    let av = a.buffer();
    let bv = b.buffer();
    let mut out = vec![0.0; batch_size * m * n];

    for t in 0..batch_size {
        let ab = &av[t * m * ka..(t + 1) * m * ka];
        let bb = &bv[t * kb * n..(t + 1) * kb * n];
        let ob = &mut out[t * m * n..(t + 1) * m * n];
        for i in 0..m {
            for l in 0..ka {
                let x = ab[i * ka + l];
                if x == 0.0 {
                    continue;
                }
                for j in 0..n {
                    ob[i * n + j] += x * bb[l * n + j];
                }
            }
        }
    }

    Ok(Tensor::from_vec(&out_extents, out).as_type(a.data_type()))
}

/// Largest `k` entries along the last axis, values descending; ties keep
/// the lower index first. Returns (values, indices).
pub fn top_k(x: &Tensor, k: usize) -> (Tensor, Tensor) {
    let rank = x.rank();
    let row = x.extent(rank - 1);
    assert!(k <= row);

    let lead = &x.extents()[..rank - 1];
    let mut out_extents = lead.to_vec();
    out_extents.push(k);

    let rows: usize = lead.iter().product();
    let mut values = Vec::with_capacity(rows * k);
    let mut indices = Vec::with_capacity(rows * k);

    let x = x.contiguous();
    let buf = x.buffer();
    for r in 0..rows {
        let mut entries: Vec<(usize, f32)> = buf[r * row..(r + 1) * row]
            .iter()
            .copied()
            .enumerate()
            .collect();
        entries.sort_by(|(i1, v1), (i2, v2)| {
            v2.partial_cmp(v1).unwrap_or(std::cmp::Ordering::Equal).then(i1.cmp(i2))
        });
        for &(i, v) in entries.iter().take(k) {
            values.push(v);
            indices.push(i as f32);
        }
    }

    (
        Tensor::from_vec(&out_extents, values).as_type(x.data_type()),
        Tensor::from_vec(&out_extents, indices).as_type(DataType::Long),
    )
}

/// Flattens everything after the batch axis, the usual feed into a dense
/// matrix product.
pub fn flatten_batch(x: &Tensor) -> Tensor {
    let batch = x.extent(0);
    let rest: usize = x.extents()[1..].iter().product();
    x.view(&[batch, rest])
}

/// Materializes a one-hot of the per-row maximum (last axis); ties pick
/// the first occurrence.
pub fn hardmax_rows(x: &Tensor) -> Tensor {
    assert_eq!(x.rank(), 2);
    let (rows, cols) = (x.extent(0), x.extent(1));
    let x = x.contiguous();
    let buf = x.buffer();
    let mut out = vec![0.0; rows * cols];
    for r in 0..rows {
        let row = &buf[r * cols..(r + 1) * cols];
        let mut best = 0;
        for (i, v) in row.iter().enumerate() {
            if *v > row[best] {
                best = i;
            }
        }
        out[r * cols + best] = 1.0;
    }
    Tensor::from_vec(&[rows, cols], out).as_type(x.data_type())
}

/// Numerically stable softmax over the last axis of a 2-D view.
pub fn softmax_rows(x: &Tensor, log: bool) -> Tensor {
    assert_eq!(x.rank(), 2);
    let (rows, cols) = (x.extent(0), x.extent(1));
    let x = x.contiguous();
    let buf = x.buffer();
    let mut out = vec![0.0; rows * cols];
    for r in 0..rows {
        let row = &buf[r * cols..(r + 1) * cols];
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut denom = 0.0;
        for v in row {
            denom += (v - max).exp();
        }
        for (i, v) in row.iter().enumerate() {
            out[r * cols + i] = if log {
                (v - max) - denom.ln()
            } else {
                (v - max).exp() / denom
            };
        }
    }
    Tensor::from_vec(&[rows, cols], out).as_type(x.data_type())
}
