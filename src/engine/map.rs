use crate::shape::{union, ShapeError};
use crate::tensor::{DataType, Tensor};

/// Elementwise unary map. The output keeps the input extents; the element
/// type is chosen by the caller.
pub fn map<F>(x: &Tensor, data_type: DataType, f: F) -> Tensor
where
    F: Fn(f32) -> f32,
{
    Tensor::from_iter(x.extents(), x.iter().map(f)).as_type(data_type)
}

/// Elementwise binary map under numpy-style broadcasting.
pub fn map2<F>(x1: &Tensor, x2: &Tensor, data_type: DataType, f: F) -> Result<Tensor, ShapeError>
where
    F: Fn(f32, f32) -> f32,
{
    let extents = union(x1.extents(), x2.extents())?;
    let a = x1.expand(&extents);
    let b = x2.expand(&extents);

    Ok(Tensor::from_iter(&extents, a.iter().zip(b.iter()).map(|(v1, v2)| f(v1, v2)))
        .as_type(data_type))
}

fn arith<F>(x1: &Tensor, x2: &Tensor, f: F) -> Result<Tensor, ShapeError>
where
    F: Fn(f32, f32) -> f32,
{
    map2(x1, x2, x1.data_type(), f)
}

fn compare<F>(x1: &Tensor, x2: &Tensor, f: F) -> Result<Tensor, ShapeError>
where
    F: Fn(f32, f32) -> bool,
{
    map2(x1, x2, DataType::Bool, |a, b| if f(a, b) { 1.0 } else { 0.0 })
}

// ******************************** Binary ******************************** //

pub fn add(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    arith(x1, x2, |a, b| a + b)
}

pub fn sub(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    arith(x1, x2, |a, b| a - b)
}

pub fn mul(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    arith(x1, x2, |a, b| a * b)
}

pub fn div(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    arith(x1, x2, |a, b| a / b)
}

pub fn pow(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    arith(x1, x2, |a, b| a.powf(b))
}

pub fn maximum(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    arith(x1, x2, f32::max)
}

pub fn minimum(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    arith(x1, x2, f32::min)
}

pub fn equal(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    compare(x1, x2, |a, b| a == b)
}

pub fn greater(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    compare(x1, x2, |a, b| a > b)
}

pub fn less(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    compare(x1, x2, |a, b| a < b)
}

pub fn logical_and(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    compare(x1, x2, |a, b| a != 0.0 && b != 0.0)
}

pub fn logical_or(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    compare(x1, x2, |a, b| a != 0.0 || b != 0.0)
}

pub fn logical_xor(x1: &Tensor, x2: &Tensor) -> Result<Tensor, ShapeError> {
    compare(x1, x2, |a, b| (a != 0.0) != (b != 0.0))
}

// ******************************** Unary ******************************** //

pub fn abs(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::abs)
}

pub fn ceil(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::ceil)
}

pub fn exp(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::exp)
}

pub fn floor(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::floor)
}

pub fn log(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::ln)
}

pub fn neg(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| -v)
}

pub fn reciprocal(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| 1.0 / v)
}

pub fn sqrt(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::sqrt)
}

pub fn sign(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::signum)
}

pub fn identity(x: &Tensor) -> Tensor {
    x.clone()
}

pub fn logical_not(x: &Tensor) -> Tensor {
    map(x, DataType::Bool, |v| if v == 0.0 { 1.0 } else { 0.0 })
}

pub fn relu(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| v.max(0.0))
}

pub fn sigmoid(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| 1.0 / (1.0 + (-v).exp()))
}

pub fn tanh(x: &Tensor) -> Tensor {
    map(x, x.data_type(), f32::tanh)
}

pub fn softplus(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| (1.0 + v.exp()).ln())
}

pub fn softsign(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| v / (1.0 + v.abs()))
}

pub fn elu(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| if v < 0.0 { v.exp() - 1.0 } else { v })
}

pub fn selu(x: &Tensor) -> Tensor {
    // canonical constants of the scaled exponential linear unit
    const ALPHA: f32 = 1.673_263_2;
    const SCALE: f32 = 1.050_701;
    map(x, x.data_type(), |v| {
        if v < 0.0 {
            SCALE * ALPHA * (v.exp() - 1.0)
        } else {
            SCALE * v
        }
    })
}

pub fn hard_sigmoid(x: &Tensor) -> Tensor {
    map(x, x.data_type(), |v| (v * 0.2 + 0.5).clamp(0.0, 1.0))
}

pub fn clip_by_value(x: &Tensor, min: f32, max: f32) -> Tensor {
    map(x, x.data_type(), |v| v.clamp(min, max))
}

pub fn add_scalar(x: &Tensor, s: f32) -> Tensor {
    map(x, x.data_type(), |v| v + s)
}

pub fn mul_scalar(x: &Tensor, s: f32) -> Tensor {
    map(x, x.data_type(), |v| v * s)
}
