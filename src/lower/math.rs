//! Elementwise, variadic and reduction rules.

use crate::engine::layout::stack;
use crate::engine::{linalg, map, reduce};
use crate::error::Error;
use crate::graph::{Node, SymbolTable};
use crate::lower::{explicit_broadcast, Lowering};
use crate::shape::{self, ShapeError};
use crate::tensor::Tensor;

/// Binary rule body. The legacy broadcast attribute pins the second
/// operand's axes at an explicit position; without it, operands align
/// trailing-first as usual.
fn bin_op<F>(node: &Node, table: &SymbolTable, f: F) -> Result<Vec<Tensor>, Error>
where
    F: Fn(&Tensor, &Tensor) -> Result<Tensor, ShapeError>,
{
    let x = table.fetch(&node.inputs[0]);
    let y = table.fetch(&node.inputs[1]);
    let out = if node.attr_int_or("broadcast", 0) == 1 && node.has_attr("axis") {
        let axis = node.attr_int("axis")? as usize;
        f(x, &explicit_broadcast(y, axis, x.rank()))?
    } else {
        f(x, y)?
    };
    Ok(vec![out])
}

pub fn add(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::add)
}

pub fn sub(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::sub)
}

pub fn mul(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::mul)
}

pub fn div(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::div)
}

pub fn pow(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::pow)
}

pub fn and(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::logical_and)
}

pub fn or(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::logical_or)
}

pub fn xor(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::logical_xor)
}

pub fn equal(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::equal)
}

pub fn greater(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::greater)
}

pub fn less(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    bin_op(node, table, map::less)
}

/// Variadic elementwise reductions stack the operands and reduce over the
/// fresh axis, so any number of inputs costs one pass.
fn variadic(node: &Node, table: &SymbolTable, op: reduce::Reduce) -> Vec<Tensor> {
    let values: Vec<Tensor> = node.inputs.iter().map(|n| table.fetch(n).clone()).collect();
    let stacked = stack(&values, 0);
    vec![reduce::reduce(&stacked, &[0], false, op)]
}

pub fn max_variadic(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    Ok(variadic(node, table, reduce::Reduce::Max))
}

pub fn min_variadic(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    Ok(variadic(node, table, reduce::Reduce::Min))
}

pub fn sum_variadic(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    Ok(variadic(node, table, reduce::Reduce::Sum))
}

pub fn mean_variadic(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let values: Vec<Tensor> = node.inputs.iter().map(|n| table.fetch(n).clone()).collect();
    let count = values.len();
    let stacked = stack(&values, 0);
    Ok(vec![map::mul_scalar(
        &reduce::sum(&stacked, &[0], false),
        1.0 / count as f32,
    )])
}

/// Dedicated reductions keep reduced axes by default; absent `axes` means
/// every axis.
fn reduce_args(node: &Node, rank: usize) -> Result<(Vec<usize>, bool), Error> {
    let keep_dims = node.attr_int_or("keepdims", 1) == 1;
    let axes = match node.attrs.get("axes") {
        Some(_) => {
            let raw = node.attr_ints("axes")?;
            let signed: Vec<isize> = raw.iter().map(|&a| a as isize).collect();
            shape::axes_to_arr(&signed, rank)?.to_vec()
        }
        None => (0..rank).collect(),
    };
    Ok((axes, keep_dims))
}

pub fn reduce_sum(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    Ok(vec![reduce::sum(x, &axes, keep)])
}

pub fn reduce_mean(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    Ok(vec![reduce::mean(x, &axes, keep)])
}

pub fn reduce_max(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    Ok(vec![reduce::max(x, &axes, keep)])
}

pub fn reduce_min(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    Ok(vec![reduce::min(x, &axes, keep)])
}

pub fn reduce_prod(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    Ok(vec![reduce::prod(x, &axes, keep)])
}

pub fn reduce_log_sum_exp(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    Ok(vec![reduce::log_sum_exp(x, &axes, keep)])
}

pub fn reduce_l1(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    Ok(vec![reduce::norm(x, 1, &axes, keep)])
}

pub fn reduce_sum_square(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (axes, keep) = reduce_args(node, x.rank())?;
    let squared = map::mul(x, x)?;
    Ok(vec![reduce::sum(&squared, &axes, keep)])
}

fn arg_reduce(
    node: &Node,
    table: &SymbolTable,
    cx: &mut Lowering,
    op: reduce::ReduceArg,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let axis = shape::axis_to_usize(node.attr_int("axis")? as isize, x.rank())?;
    if node.attr_int_or("keepdims", 1) == 1 {
        cx.warn(node, "keepdims is not honored; the reduced axis is dropped");
    }
    Ok(vec![reduce::reduce_arg(x, axis, op)])
}

pub fn arg_max(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    arg_reduce(node, table, cx, reduce::ReduceArg::Max)
}

pub fn arg_min(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    arg_reduce(node, table, cx, reduce::ReduceArg::Min)
}

/// Missing bounds fall back to the operand's own extrema, which makes the
/// clip a no-op on that side.
pub fn clip(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let all: Vec<usize> = (0..x.rank()).collect();
    let min_val = if node.has_attr("min") {
        node.attr_float("min")?
    } else {
        reduce::min(x, &all, false).scalar_value()
    };
    let max_val = if node.has_attr("max") {
        node.attr_float("max")?
    } else {
        reduce::max(x, &all, false).scalar_value()
    };
    Ok(vec![map::clip_by_value(x, min_val, max_val)])
}

pub fn gemm(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = linalg::flatten_batch(table.fetch(&node.inputs[0]));
    let y = table.fetch(&node.inputs[1]);
    let z = table.fetch(&node.inputs[2]);

    let x = if node.attr_int_or("transA", 0) == 1 {
        x.transpose(0, 1).contiguous()
    } else {
        x
    };
    let y = if node.attr_int_or("transB", 0) == 1 {
        y.transpose(0, 1).contiguous()
    } else {
        y.clone()
    };

    let alpha = node.attr_float_or("alpha", 1.0);
    let beta = node.attr_float_or("beta", 1.0);
    let xy = linalg::matmul(&x, &y)?;
    let out = map::add(&map::mul_scalar(&xy, alpha), &map::mul_scalar(z, beta))?;
    Ok(vec![out])
}

pub fn mat_mul(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let out = linalg::matmul(table.fetch(&node.inputs[0]), table.fetch(&node.inputs[1]))?;
    Ok(vec![out])
}

pub fn top_k(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let k = node.attr_int_or("k", 1) as usize;
    let (values, indices) = linalg::top_k(x, k);
    Ok(vec![values, indices])
}

pub fn lp_normalization(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let axis = shape::axis_to_usize(node.attr_int_or("axis", -1) as isize, x.rank())?;
    let p = node.attr_int_or("p", 2);
    Ok(vec![reduce::norm(x, p, &[axis], true)])
}
