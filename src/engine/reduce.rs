use crate::engine::map;
use crate::shape::{increment_index as step, Array, ShapeError};
use crate::tensor::{DataType, Tensor};

#[derive(Copy, Clone, Debug)]
pub enum Reduce {
    Sum,
    Prod,
    Max,
    Min,
}

#[derive(Copy, Clone, Debug)]
pub enum ReduceArg {
    Max,
    Min,
}

fn reduced_extents(extents: &[usize], axes: &[usize], keep_dims: bool) -> Array {
    let mut out = Array::new();
    for i in 0..extents.len() {
        if !axes.contains(&i) {
            out.push(extents[i]);
        } else if keep_dims {
            out.push(1);
        }
    }
    out
}

/// Strides of the reduced output indexed by *input* axis; reduced axes
/// contribute nothing.
fn accumulation_strides(extents: &[usize], axes: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; extents.len()];
    let mut s = 1;
    for a in (0..extents.len()).rev() {
        if !axes.contains(&a) {
            strides[a] = s;
            s *= extents[a];
        }
    }
    strides
}


pub fn reduce(x: &Tensor, axes: &[usize], keep_dims: bool, op: Reduce) -> Tensor {
    let extents = x.extents();
    let out_extents = reduced_extents(extents, axes, keep_dims);
    let out_size = out_extents.iter().product();

    let init = match op {
        Reduce::Sum => 0.0,
        Reduce::Prod => 1.0,
        Reduce::Max => f32::NEG_INFINITY,
        Reduce::Min => f32::INFINITY,
    };
    let fold: fn(f32, f32) -> f32 = match op {
        Reduce::Sum => |acc, v| acc + v,
        Reduce::Prod => |acc, v| acc * v,
        Reduce::Max => f32::max,
        Reduce::Min => f32::min,
    };

    let strides = accumulation_strides(extents, axes);
    let mut acc = vec![init; out_size];
    let mut index = vec![0; extents.len()];

    for v in x.iter() {
        let o = index.iter().zip(&strides).map(|(i, s)| i * s).sum::<usize>();
        acc[o] = fold(acc[o], v);
        step(&mut index, extents);
    }

    Tensor::from_vec(&out_extents, acc).as_type(x.data_type())
}

pub fn sum(x: &Tensor, axes: &[usize], keep_dims: bool) -> Tensor {
    reduce(x, axes, keep_dims, Reduce::Sum)
}

pub fn mean(x: &Tensor, axes: &[usize], keep_dims: bool) -> Tensor {
    let count = axes.iter().map(|a| x.extent(*a)).product::<usize>() as f32;
    map::mul_scalar(&sum(x, axes, keep_dims), 1.0 / count)
}

pub fn max(x: &Tensor, axes: &[usize], keep_dims: bool) -> Tensor {
    reduce(x, axes, keep_dims, Reduce::Max)
}

pub fn min(x: &Tensor, axes: &[usize], keep_dims: bool) -> Tensor {
    reduce(x, axes, keep_dims, Reduce::Min)
}

pub fn prod(x: &Tensor, axes: &[usize], keep_dims: bool) -> Tensor {
    reduce(x, axes, keep_dims, Reduce::Prod)
}

pub fn log_sum_exp(x: &Tensor, axes: &[usize], keep_dims: bool) -> Tensor {
    map::log(&sum(&map::exp(x), axes, keep_dims))
}

/// Lp norm along the given axes; `p` is a positive integer order.
pub fn norm(x: &Tensor, p: i64, axes: &[usize], keep_dims: bool) -> Tensor {
    let powed = map::map(x, x.data_type(), |v| v.abs().powi(p as i32));
    map::map(&sum(&powed, axes, keep_dims), x.data_type(), |v| {
        v.powf(1.0 / p as f32)
    })
}

/// Index of the extremum along one axis; the axis is removed and the
/// result carries integer indices.
pub fn reduce_arg(x: &Tensor, axis: usize, op: ReduceArg) -> Tensor {
    let extents = x.extents();
    let out_extents = reduced_extents(extents, &[axis], false);
    let out_size = out_extents.iter().product();

    let better: fn(f32, f32) -> bool = match op {
        ReduceArg::Max => |v, best| v > best,
        ReduceArg::Min => |v, best| v < best,
    };

    let strides = accumulation_strides(extents, &[axis]);
    let mut best = vec![
        match op {
            ReduceArg::Max => f32::NEG_INFINITY,
            ReduceArg::Min => f32::INFINITY,
        };
        out_size
    ];
    let mut arg = vec![0.0; out_size];
    let mut index = vec![0; extents.len()];

    for v in x.iter() {
        let o = index.iter().zip(&strides).map(|(i, s)| i * s).sum::<usize>();
        if better(v, best[o]) {
            best[o] = v;
            arg[o] = index[axis] as f32;
        }
        step(&mut index, extents);
    }

    Tensor::from_vec(&out_extents, arg).as_type(DataType::Long)
}

pub fn argmax(x: &Tensor, axis: usize) -> Tensor {
    reduce_arg(x, axis, ReduceArg::Max)
}

pub fn argmin(x: &Tensor, axis: usize) -> Tensor {
    reduce_arg(x, axis, ReduceArg::Min)
}

/// Per-axis mean and (biased) variance, axes removed.
pub fn moments(x: &Tensor, axes: &[usize]) -> Result<(Tensor, Tensor), ShapeError> {
    let m = mean(x, axes, false);
    let sq = mean(&map::map(x, x.data_type(), |v| v * v), axes, false);
    let var = map::sub(&sq, &map::mul(&m, &m)?)?;
    Ok((m, var))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_axes() {
        let x = Tensor::new([[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let y = sum(&x, &[0], false);
        assert_eq!(y.extents(), &[2]);
        assert_eq!(y.to_vec(), vec![9.0, 12.0]);

        let y = sum(&x, &[1], true);
        assert_eq!(y.extents(), &[3, 1]);
        assert_eq!(y.to_vec(), vec![3.0, 7.0, 11.0]);

        let y = sum(&x, &[0, 1], false);
        assert_eq!(y.extents(), &[] as &[usize]);
        assert_eq!(y.to_vec(), vec![21.0]);
    }

    #[test]
    fn test_mean_keep_dims() {
        let x = Tensor::new([[[1.0_f32, 3.0], [5.0, 7.0]]]);
        let y = mean(&x, &[1, 2], true);
        assert_eq!(y.extents(), &[1, 1, 1]);
        assert_eq!(y.to_vec(), vec![4.0]);
    }

    #[test]
    fn test_max_min_prod() {
        let x = Tensor::new([[1.0_f32, -2.0], [3.0, 4.0]]);
        assert_eq!(max(&x, &[0], false).to_vec(), vec![3.0, 4.0]);
        assert_eq!(min(&x, &[1], false).to_vec(), vec![-2.0, 3.0]);
        assert_eq!(prod(&x, &[0], false).to_vec(), vec![3.0, -8.0]);
    }

    #[test]
    fn test_argmax() {
        let x = Tensor::new([[-0.3_f32, 0.9, -0.8], [0.5, -1.5, 0.8]]);
        let y = argmax(&x, 1);
        assert_eq!(y.data_type(), DataType::Long);
        assert_eq!(y.to_vec(), vec![1.0, 2.0]);
        let y = argmin(&x, 0);
        assert_eq!(y.to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_moments() {
        let x = Tensor::new([[1.0_f32, 2.0], [3.0, 4.0]]);
        let (m, v) = moments(&x, &[0]).unwrap();
        assert_eq!(m.to_vec(), vec![2.0, 3.0]);
        assert_eq!(v.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_norm() {
        let x = Tensor::new([[3.0_f32, -4.0]]);
        let y = norm(&x, 2, &[1], true);
        assert!(Tensor::all_close(&y, &Tensor::new([[5.0_f32]]), 1e-5));
        let y = norm(&x, 1, &[1], false);
        assert_eq!(y.to_vec(), vec![7.0]);
    }
}
