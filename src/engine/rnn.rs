use crate::engine::linalg::matmul;
use crate::shape::ShapeError;
use crate::tensor::Tensor;

/// Full-sequence output plus final hidden and cell state.
pub struct LstmOutput {
    pub output: Tensor,
    pub hidden: Tensor,
    pub cell: Tensor,
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Single-layer, single-direction LSTM over a time-major sequence.
///
/// `x` is [T, B, I]; `w` [4H, I] and `r` [4H, H] hold the input and
/// recurrence weights in i, o, f, c gate order; `b`, when present, is the
/// concatenation [8H] of input and recurrence biases. Gate activations
/// are fixed to sigmoid/sigmoid/sigmoid and tanh for the candidate; the
/// optional `clip` bounds the cell state symmetrically.
pub fn lstm(
    x: &Tensor,
    w: &Tensor,
    r: &Tensor,
    b: Option<&Tensor>,
    hidden_size: usize,
    clip: Option<f32>,
) -> Result<LstmOutput, ShapeError> {
    assert_eq!(x.rank(), 3);
    let (steps, batch) = (x.extent(0), x.extent(1));
    let h4 = 4 * hidden_size;
    if w.extent(0) != h4 || r.extent(0) != h4 {
        return Err(ShapeError::SizeMismatch(h4, w.extent(0)));
    }

    let bias: Option<Vec<f32>> = b.map(|b| {
        let v = b.contiguous().to_vec();
        // fold the two bias halves together once
        (0..h4).map(|i| v[i] + v[h4 + i]).collect()
    });

    let wt = w.transpose(0, 1).contiguous();
    let rt = r.transpose(0, 1).contiguous();

    let mut h = vec![0.0; batch * hidden_size];
    let mut c = vec![0.0; batch * hidden_size];
    let mut seq = Vec::with_capacity(steps * batch * hidden_size);

    for t in 0..steps {
        let xt = x.index(t, 0).contiguous();
        let xw = matmul(&xt, &wt)?;
        let hr = matmul(&Tensor::from_vec(&[batch, hidden_size], h.clone()), &rt)?;

        let xw = xw.buffer();
        let hr = hr.buffer();

        for n in 0..batch {
            for j in 0..hidden_size {
                let gate = |g: usize| {
                    let idx = n * h4 + g * hidden_size + j;
                    xw[idx] + hr[idx] + bias.as_ref().map_or(0.0, |b| b[g * hidden_size + j])
                };

                let i = sigmoid(gate(0));
                let o = sigmoid(gate(1));
                let f = sigmoid(gate(2));
                let g = gate(3).tanh();

                let idx = n * hidden_size + j;
                let mut cell = f * c[idx] + i * g;
                if let Some(limit) = clip {
                    cell = cell.clamp(-limit, limit);
                }
                c[idx] = cell;
                h[idx] = o * cell.tanh();
            }
        }

        seq.extend_from_slice(&h);
    }

    Ok(LstmOutput {
        output: Tensor::from_vec(&[steps, batch, hidden_size], seq),
        hidden: Tensor::from_vec(&[batch, hidden_size], h),
        cell: Tensor::from_vec(&[batch, hidden_size], c),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lstm_shapes() {
        let x = Tensor::from_scalar(&[5, 2, 3], 0.5);
        let w = Tensor::from_scalar(&[8, 3], 0.1);
        let r = Tensor::from_scalar(&[8, 2], 0.1);
        let out = lstm(&x, &w, &r, None, 2, None).unwrap();
        assert_eq!(out.output.extents(), &[5, 2, 2]);
        assert_eq!(out.hidden.extents(), &[2, 2]);
        assert_eq!(out.cell.extents(), &[2, 2]);
    }

    #[test]
    fn test_lstm_zero_weights() {
        // zero weights and inputs keep the state at the origin
        let x = Tensor::zeros(&[3, 1, 2]);
        let w = Tensor::zeros(&[4, 2]);
        let r = Tensor::zeros(&[4, 1]);
        let out = lstm(&x, &w, &r, None, 1, None).unwrap();
        assert_eq!(out.output.to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_lstm_single_step() {
        // one step, scalar gates; checked against the closed form
        let x = Tensor::from_vec(&[1, 1, 1], vec![1.0]);
        let w = Tensor::from_vec(&[4, 1], vec![1.0, 1.0, 1.0, 1.0]);
        let r = Tensor::from_vec(&[4, 1], vec![0.0, 0.0, 0.0, 0.0]);
        let out = lstm(&x, &w, &r, None, 1, None).unwrap();

        let s = 1.0 / (1.0 + (-1.0_f32).exp());
        let cell = s * 1.0_f32.tanh();
        let expect = s * cell.tanh();
        assert!((out.hidden.scalar_value() - expect).abs() < 1e-6);
    }

    #[test]
    fn test_lstm_clip() {
        let x = Tensor::from_scalar(&[4, 1, 1], 10.0);
        let w = Tensor::from_scalar(&[4, 1], 10.0);
        let r = Tensor::zeros(&[4, 1]);
        let out = lstm(&x, &w, &r, None, 1, Some(0.5)).unwrap();
        assert!(out.cell.scalar_value() <= 0.5);
    }

    #[test]
    fn test_lstm_size_mismatch() {
        let x = Tensor::zeros(&[1, 1, 2]);
        let w = Tensor::zeros(&[6, 2]);
        let r = Tensor::zeros(&[8, 1]);
        assert!(lstm(&x, &w, &r, None, 2, None).is_err());
    }
}
