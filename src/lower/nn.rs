//! Neural-network rules: pooling, convolution, normalization, activations,
//! recurrence and random generators.
//!
//! Spatial operators carry the layout reconciliation: operands are stored
//! channel-first, but without acceleration the compute layout is
//! channel-last, so these rules permute in, compute, and permute back.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use crate::engine::conv::{bias_add, convolution};
use crate::engine::layout::{concat, pad, reverse, split_equal, stack, PadMode};
use crate::engine::pool::{pool, Padding, PoolKind};
use crate::engine::{linalg, map, reduce, rnn};
use crate::error::Error;
use crate::fallback::pool_portable;
use crate::graph::{Node, SymbolTable};
use crate::layout::perm_between;
use crate::lower::{explicit_broadcast, usizes, Lowering};
use crate::shape::axis_to_usize;
use crate::tensor::Tensor;

// ******************************** Pooling ******************************** //

fn pool_impl(
    node: &Node,
    table: &SymbolTable,
    cx: &mut Lowering,
    kind: PoolKind,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let rank = x.rank();
    let spatial = rank - 2;
    let kernel = usizes(&node.attr_ints("kernel_shape")?);
    let strides = usizes(&node.attr_ints_or("strides", &vec![1; spatial]));
    let in_spatial = &x.extents()[2..];

    // A kernel larger than the whole spatial extent is a global pool;
    // none of the padding arithmetic below applies.
    if in_spatial.iter().zip(&kernel).all(|(&d, &k)| d < k) {
        let axes = window_axes(rank);
        let y = match kind {
            PoolKind::Avg => reduce::mean(x, &axes, true),
            PoolKind::Max => reduce::max(x, &axes, true),
        };
        return Ok(vec![y]);
    }

    // Only symmetric-or-end-heavy padding has a native expression.
    let native = match node.attr_str_or("auto_pad", "").as_str() {
        "SAME_UPPER" => Some(Padding::Same),
        "VALID" => Some(Padding::Valid),
        _ => None,
    };

    if let Some(padding) = native {
        let lp = cx.layout(rank);
        let y = if lp.needs_transform() {
            let to = perm_between(lp.storage, lp.compute, rank);
            let from = perm_between(lp.compute, lp.storage, rank);
            pool(
                &x.permute(&to).contiguous(),
                &kernel,
                &strides,
                padding,
                kind,
                lp.compute,
            )
            .permute(&from)
            .contiguous()
        } else {
            pool(x, &kernel, &strides, padding, kind, lp.compute)
        };
        return Ok(vec![y]);
    }

    // Start-heavy or fully explicit padding goes through the portable
    // evaluator, which works on the storage layout directly.
    let mut pads = usizes(&node.attr_ints_or("pads", &vec![0; 2 * spatial]));
    let mut out_spatial = vec![0; spatial];
    if node.attr_str_or("auto_pad", "") == "SAME_LOWER" {
        for i in 0..spatial {
            let out = (in_spatial[i] + strides[i] - 1) / strides[i];
            let total = ((out - 1) * strides[i] + kernel[i]).saturating_sub(in_spatial[i]);
            pads[i + spatial] = total / 2;
            pads[i] = total - total / 2;
            out_spatial[i] = out;
        }
    } else {
        for i in 0..spatial {
            let padded = in_spatial[i] + pads[i] + pads[i + spatial];
            out_spatial[i] = (padded - kernel[i]) / strides[i] + 1;
        }
    }
    Ok(vec![pool_portable(
        x,
        &kernel,
        &strides,
        &pads,
        &out_spatial,
        kind,
    )])
}

pub fn average_pool(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    pool_impl(node, table, cx, PoolKind::Avg)
}

pub fn max_pool(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    pool_impl(node, table, cx, PoolKind::Max)
}

fn window_axes(rank: usize) -> Vec<usize> {
    (2..rank).collect()
}

pub fn global_average_pool(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    Ok(vec![reduce::mean(x, &window_axes(x.rank()), true)])
}

pub fn global_max_pool(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    Ok(vec![reduce::max(x, &window_axes(x.rank()), true)])
}

pub fn global_lp_pool(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let p = node.attr_int_or("p", 2);
    Ok(vec![reduce::norm(x, p, &window_axes(x.rank()), true)])
}

// ******************************** Convolution ******************************** //

/// Shared body for the forward and transposed weight conventions. Padding
/// is applied explicitly up front; the engine convolution itself is always
/// VALID.
fn conv_impl(
    node: &Node,
    table: &SymbolTable,
    cx: &mut Lowering,
    transpose: bool,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]).clone();
    let w = table.fetch(&node.inputs[1]);
    let w_rank = w.rank();

    // interchange weights are [out, in, spatial...] (transposed convention
    // swaps the first two); the engine wants [spatial..., in, out]
    let mut perm: Vec<usize> = (2..w_rank).collect();
    if transpose {
        perm.extend([0, 1]);
    } else {
        perm.extend([1, 0]);
    }
    let weights = w.permute(&perm).contiguous();

    if node.has_attr("kernel_shape") {
        let kernel = usizes(&node.attr_ints("kernel_shape")?);
        if kernel != w.extents()[2..] {
            return Err(Error::unsupported(
                &node.name,
                format!(
                    "kernel_shape [{:?}] does not match weight extents [{:?}]",
                    kernel,
                    &w.extents()[2..]
                ),
            ));
        }
    }

    let rank = x.rank();
    let spatial = rank - 2;
    let strides = usizes(&node.attr_ints_or("strides", &vec![1; spatial]));
    let dilations = usizes(&node.attr_ints_or("dilations", &vec![1; spatial]));

    let x = if node.has_attr("pads") {
        let pads = usizes(&node.attr_ints("pads")?);
        let mut pairs = vec![(0, 0); 2];
        pairs.extend((0..spatial).map(|i| (pads[i], pads[i + spatial])));
        pad(&x, &pairs, PadMode::Constant(0.0))
    } else {
        x
    };

    let lp = cx.layout(rank);
    let (x_c, channel_axis) = if lp.needs_transform() {
        let to = perm_between(lp.storage, lp.compute, rank);
        (x.permute(&to).contiguous(), rank - 1)
    } else {
        (x, 1)
    };

    let group = node.attr_int_or("group", 1) as usize;
    let y = if group > 1 {
        let weight_groups = split_equal(&weights, group, w_rank - 1);
        let x_groups = split_equal(&x_c, group, channel_axis);
        let mut parts = Vec::with_capacity(group);
        for (xg, wg) in x_groups.iter().zip(&weight_groups) {
            parts.push(convolution(
                &xg.contiguous(),
                &wg.contiguous(),
                &strides,
                &dilations,
                lp.compute,
            )?);
        }
        concat(&parts, channel_axis)
    } else {
        convolution(&x_c, &weights, &strides, &dilations, lp.compute)?
    };

    let y = if node.inputs.len() > 2 {
        bias_add(&y, table.fetch(&node.inputs[2]), lp.compute)?
    } else {
        y
    };

    let y = if lp.needs_transform() {
        let from = perm_between(lp.compute, lp.storage, rank);
        y.permute(&from).contiguous()
    } else {
        y
    };
    Ok(vec![y])
}

pub fn conv(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    conv_impl(node, table, cx, false)
}

pub fn conv_transpose(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    conv_impl(node, table, cx, true)
}

// ******************************** Normalization ******************************** //

pub fn batch_normalization(
    node: &Node,
    table: &SymbolTable,
    cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let rank = x.rank();
    let scale = explicit_broadcast(table.fetch(&node.inputs[1]), 1, rank);
    let bias = explicit_broadcast(table.fetch(&node.inputs[2]), 1, rank);
    let mut mean = explicit_broadcast(table.fetch(&node.inputs[3]), 1, rank);
    let mut variance = explicit_broadcast(table.fetch(&node.inputs[4]), 1, rank);
    let epsilon = node.attr_float_or("epsilon", 1e-5);

    if node.attr_int_or("is_test", 0) == 0 {
        // training form: blend batch statistics into the running ones;
        // the blend is used for this node only and never written back
        cx.warn(
            node,
            "batch statistics follow the spatial flag's declared axes; \
             the blended running statistics are not persisted",
        );
        let momentum = node.attr_float_or("momentum", 0.9);
        let axes: Vec<usize> = if node.attr_int_or("spatial", 1) == 1 {
            std::iter::once(0).chain(2..rank).collect()
        } else {
            vec![0]
        };
        let (m, v) = reduce::moments(x, &axes)?;
        let m = explicit_broadcast(&m, 1, rank);
        let v = explicit_broadcast(&v, 1, rank);
        mean = map::add(
            &map::mul_scalar(&mean, momentum),
            &map::mul_scalar(&m, 1.0 - momentum),
        )?;
        variance = map::add(
            &map::mul_scalar(&variance, momentum),
            &map::mul_scalar(&v, 1.0 - momentum),
        )?;
    }

    let centered = map::sub(x, &mean)?;
    let denom = map::sqrt(&map::add_scalar(&variance, epsilon));
    let y = map::add(&map::mul(&map::div(&centered, &denom)?, &scale)?, &bias)?;
    Ok(vec![y])
}

/// Local response normalization across channels. The size attribute is a
/// window diameter; the divisor exponentiates the windowed sum of squares.
pub fn lrn(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let alpha = node.attr_float("alpha")?;
    let beta = node.attr_float("beta")?;
    let bias = node.attr_float("bias")?;
    let size = node.attr_int("size")? as usize;

    let alpha_scaled = alpha / size as f32;
    let radius = (size - 1) / 2;
    let channels = x.extent(1);

    let squared = map::mul(x, x)?;
    let mut parts = Vec::with_capacity(channels);
    for c in 0..channels {
        let lo = c.saturating_sub(radius);
        let hi = (c + radius + 1).min(channels);
        let window = squared.slice(lo, hi, 1).contiguous();
        parts.push(reduce::sum(&window, &[1], true));
    }
    let sums = concat(&parts, 1);

    let denom = map::map(
        &map::add_scalar(&map::mul_scalar(&sums, alpha_scaled), bias),
        x.data_type(),
        move |v| v.powf(beta),
    );
    Ok(vec![map::div(x, &denom)?])
}

// ******************************** Recurrence ******************************** //

fn pack_single(out: rnn::LstmOutput) -> Vec<Tensor> {
    vec![
        out.output.expand_axis(1).contiguous(),
        out.hidden.expand_axis(0).contiguous(),
        out.cell.expand_axis(0).contiguous(),
    ]
}

pub fn lstm(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let hidden_size = node.attr_int("hidden_size")? as usize;
    let direction = node.attr_str_or("direction", "forward");
    let clip = if node.has_attr("clip") {
        Some(node.attr_float("clip")?)
    } else {
        None
    };

    if let Ok(acts) = node.attr_strs("activations") {
        let acts: Vec<String> = acts.iter().map(|a| a.to_lowercase()).collect();
        let check = |cx: &mut Lowering, gates: &[String]| {
            if gates.len() >= 2 && (gates[0] != "sigmoid" || gates[1] != "tanh") {
                cx.warn(node, "gate activations are fixed to sigmoid and tanh");
            }
            if gates.len() >= 3 && gates[2] != "tanh" {
                cx.warn(
                    node,
                    format!("candidate activation '{}' is replaced by tanh", gates[2]),
                );
            }
        };
        check(cx, &acts);
        if direction == "bidirectional" && acts.len() >= 6 {
            check(cx, &acts[3..]);
        }
    }

    let x = table.fetch(&node.inputs[0]);
    let w = table.fetch(&node.inputs[1]);
    let r = table.fetch(&node.inputs[2]);
    let b = node
        .inputs
        .get(3)
        .filter(|n| !n.is_empty())
        .map(|n| table.fetch(n));

    let run = |xd: &Tensor, d: usize| -> Result<rnn::LstmOutput, Error> {
        let wd = w.index(d, 0).contiguous();
        let rd = r.index(d, 0).contiguous();
        let bd = b.map(|b| b.index(d, 0).contiguous());
        Ok(rnn::lstm(xd, &wd, &rd, bd.as_ref(), hidden_size, clip)?)
    };

    match direction.as_str() {
        "forward" => Ok(pack_single(run(x, 0)?)),
        "reverse" => Ok(pack_single(run(&reverse(x, 0), 0)?)),
        "bidirectional" => {
            let fwd = run(x, 0)?;
            let bwd = run(&reverse(x, 0), 1)?;
            Ok(vec![
                stack(&[fwd.output, bwd.output], 1),
                stack(&[fwd.hidden, bwd.hidden], 0),
                stack(&[fwd.cell, bwd.cell], 0),
            ])
        }
        other => Err(Error::unsupported(
            &node.name,
            format!("unknown direction '{}'", other),
        )),
    }
}

// ******************************** Activations ******************************** //

pub fn dropout(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    if node.attr_int_or("is_test", 0) != 0 {
        return Ok(vec![x.clone()]);
    }
    let ratio = node.attr_float_or("ratio", 0.5);
    let keep = 1.0 - ratio;
    let mut rng = rand::thread_rng();
    let data: Vec<f32> = x
        .iter()
        .map(|v| if rng.gen::<f32>() < keep { v / keep } else { 0.0 })
        .collect();
    Ok(vec![Tensor::from_vec(x.extents(), data).as_type(x.data_type())])
}

pub fn elu(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    if !node.has_attr("alpha") {
        return Ok(vec![map::elu(x)]);
    }
    let alpha = node.attr_float("alpha")?;
    Ok(vec![map::map(x, x.data_type(), move |v| {
        if v < 0.0 {
            alpha * (v.exp() - 1.0)
        } else {
            v
        }
    })])
}

pub fn hard_sigmoid(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    if !node.has_attr("alpha") && !node.has_attr("beta") {
        return Ok(vec![map::hard_sigmoid(x)]);
    }
    let alpha = node.attr_float_or("alpha", 0.2);
    let beta = node.attr_float_or("beta", 0.5);
    Ok(vec![map::map(x, x.data_type(), move |v| {
        (v * alpha + beta).clamp(0.0, 1.0)
    })])
}

pub fn leaky_relu(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let alpha = if node.has_attr("alpha") {
        node.attr_float("alpha")?
    } else {
        cx.warn(node, "no alpha provided; defaulting to 0.01");
        0.01
    };
    Ok(vec![map::map(x, x.data_type(), move |v| {
        if v >= 0.0 {
            v
        } else {
            alpha * v
        }
    })])
}

pub fn p_relu(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let slope = explicit_broadcast(table.fetch(&node.inputs[1]), 1, x.rank());
    let pos = map::relu(x);
    let neg = map::mul(
        &slope,
        &map::mul_scalar(&map::sub(x, &map::abs(x))?, 0.5),
    )?;
    Ok(vec![map::add(&pos, &neg)?])
}

pub fn selu(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    cx.warn(node, "scaled-elu constant conventions diverge between vocabularies");
    let x = table.fetch(&node.inputs[0]);
    if !node.has_attr("alpha") && !node.has_attr("gamma") {
        return Ok(vec![map::selu(x)]);
    }
    let alpha = node.attr_float_or("alpha", 1.6732);
    let gamma = node.attr_float_or("gamma", 1.0507);
    Ok(vec![map::map(x, x.data_type(), move |v| {
        if v > 0.0 {
            gamma * v
        } else {
            gamma * alpha * (v.exp() - 1.0)
        }
    })])
}

pub fn thresholded_relu(
    node: &Node,
    table: &SymbolTable,
    cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let alpha = if node.has_attr("alpha") {
        node.attr_float("alpha")?
    } else {
        cx.warn(node, "no alpha provided; defaulting to 1.0");
        1.0
    };
    Ok(vec![map::map(x, x.data_type(), move |v| {
        if v > alpha {
            v
        } else {
            0.0
        }
    })])
}

// ******************************** Softmax family ******************************** //

/// Collapses the operand to 2-D around the axis, so an axis-relative
/// definition runs on the engine's row primitive.
fn collapse_axis(node: &Node, x: &Tensor) -> Result<(Vec<usize>, usize, usize), Error> {
    let rank = x.rank();
    let axis = if node.has_attr("axis") {
        axis_to_usize(node.attr_int("axis")? as isize, rank)?
    } else {
        1
    };
    let extents = x.extents().to_vec();
    let rows: usize = extents[..axis].iter().product();
    let cols: usize = extents[axis..].iter().product();
    Ok((extents, rows, cols))
}

fn softmax_impl(node: &Node, table: &SymbolTable, log: bool) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (extents, rows, cols) = collapse_axis(node, x)?;
    let y = linalg::softmax_rows(&x.view(&[rows, cols]), log);
    Ok(vec![y.view(&extents)])
}

pub fn softmax(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    softmax_impl(node, table, false)
}

pub fn log_softmax(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    softmax_impl(node, table, true)
}

pub fn hardmax(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let (extents, rows, cols) = collapse_axis(node, x)?;
    let y = linalg::hardmax_rows(&x.view(&[rows, cols]));
    Ok(vec![y.view(&extents)])
}

// ******************************** Random ******************************** //

fn sample<D: Distribution<f32>>(node: &Node, size: usize, dist: D) -> Result<Vec<f32>, Error> {
    if node.has_attr("seed") {
        let mut rng = StdRng::seed_from_u64(node.attr_float("seed")? as u64);
        Ok((0..size).map(|_| dist.sample(&mut rng)).collect())
    } else {
        let mut rng = rand::thread_rng();
        Ok((0..size).map(|_| dist.sample(&mut rng)).collect())
    }
}

fn like_type(node: &Node) -> Result<crate::tensor::DataType, Error> {
    let code = node.attr_int("dtype")?;
    crate::mapping::element_type(code)
        .ok_or_else(|| Error::unsupported(&node.name, format!("unknown element type code {}", code)))
}

pub fn random_normal_like(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let data_type = like_type(node)?;
    let mean = node.attr_float_or("mean", 0.0);
    let scale = node.attr_float_or("scale", 1.0);
    let dist = Normal::new(mean, scale)
        .map_err(|_| Error::unsupported(&node.name, "scale must be non-negative"))?;
    let data = sample(node, x.size(), dist)?;
    Ok(vec![Tensor::from_vec(x.extents(), data).as_type(data_type)])
}

pub fn random_uniform_like(
    node: &Node,
    table: &SymbolTable,
    _cx: &mut Lowering,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let data_type = like_type(node)?;
    let low = node.attr_float_or("low", 0.0);
    let high = node.attr_float_or("high", 1.0);
    if low >= high {
        return Err(Error::unsupported(&node.name, "low must be below high"));
    }
    let data = sample(node, x.size(), Uniform::new(low, high))?;
    Ok(vec![Tensor::from_vec(x.extents(), data).as_type(data_type)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::Lowering;
    use crate::tensor::DataType;

    fn run(node: &Node, table: &mut SymbolTable) -> Lowering {
        let mut cx = Lowering::new(7);
        cx.lower(node, table).unwrap();
        cx
    }

    #[test]
    fn test_average_pool_same_upper() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[1, 3, 4, 4], (0..48).map(|v| v as f32)));
        let node = Node::new("AveragePool", &["x"], &["y"])
            .attr("kernel_shape", vec![2_i64, 2])
            .attr("strides", vec![2_i64, 2])
            .attr("auto_pad", "SAME_UPPER");
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[1, 3, 2, 2]);
        assert_eq!(y.at(&[0, 0, 0, 0]), (0.0 + 1.0 + 4.0 + 5.0) / 4.0);
    }

    #[test]
    fn test_max_pool_same_lower_routes_fallback() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[1, 1, 3, 3], (1..=9).map(|v| v as f32)));
        let node = Node::new("MaxPool", &["x"], &["y"])
            .attr("kernel_shape", vec![2_i64, 2])
            .attr("strides", vec![2_i64, 2])
            .attr("auto_pad", "SAME_LOWER");
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[1, 1, 2, 2]);
        // extra padding lands at the start, so the first window holds only
        // the top-left element
        assert_eq!(y.at(&[0, 0, 0, 0]), 1.0);
        assert_eq!(y.at(&[0, 0, 1, 1]), 9.0);
    }

    #[test]
    fn test_average_pool_explicit_pads() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[1, 1, 2, 2], (1..=4).map(|v| v as f32)));
        let node = Node::new("AveragePool", &["x"], &["y"])
            .attr("kernel_shape", vec![2_i64, 2])
            .attr("pads", vec![1_i64, 1, 1, 1]);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").extents(), &[1, 1, 3, 3]);
        // corner window sees exactly one real element
        assert_eq!(table.fetch("y").at(&[0, 0, 0, 0]), 1.0);
    }

    #[test]
    fn test_pool_kernel_exceeding_spatial_is_global() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[1, 3, 4, 4], (0..48).map(|v| v as f32)));
        let node = Node::new("AveragePool", &["x"], &["y"])
            .attr("kernel_shape", vec![5_i64, 5]);
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[1, 3, 1, 1]);
        // channel 0 holds 0..16, so the global mean is 7.5
        assert_eq!(y.at(&[0, 0, 0, 0]), 7.5);

        let max = Node::new("MaxPool", &["x"], &["m"]).attr("kernel_shape", vec![5_i64, 5]);
        run(&max, &mut table);
        assert_eq!(table.fetch("m").to_vec(), vec![15.0, 31.0, 47.0]);
    }

    #[test]
    fn test_global_pools() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[1, 2, 2, 2], (1..=8).map(|v| v as f32)));
        run(&Node::new("GlobalAveragePool", &["x"], &["a"]), &mut table);
        run(&Node::new("GlobalMaxPool", &["x"], &["m"]), &mut table);
        assert_eq!(table.fetch("a").extents(), &[1, 2, 1, 1]);
        assert_eq!(table.fetch("a").to_vec(), vec![2.5, 6.5]);
        assert_eq!(table.fetch("m").to_vec(), vec![4.0, 8.0]);
    }

    #[test]
    fn test_conv_identity_kernel() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[1, 1, 3, 3], (1..=9).map(|v| v as f32)));
        // 1x1 kernel, single channel, weight 2.0
        table.insert("w", Tensor::from_vec(&[1, 1, 1, 1], vec![2.0]));
        let node = Node::new("Conv", &["x", "w"], &["y"]);
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[1, 1, 3, 3]);
        assert_eq!(y.at(&[0, 0, 2, 2]), 18.0);
    }

    #[test]
    fn test_conv_pads_and_bias() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::ones(&[1, 1, 2, 2]));
        table.insert("w", Tensor::ones(&[1, 1, 2, 2]));
        table.insert("b", Tensor::new([10.0]));
        let node = Node::new("Conv", &["x", "w", "b"], &["y"])
            .attr("pads", vec![1_i64, 1, 1, 1]);
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[1, 1, 3, 3]);
        // center window covers all four ones, corners exactly one
        assert_eq!(y.at(&[0, 0, 1, 1]), 14.0);
        assert_eq!(y.at(&[0, 0, 0, 0]), 11.0);
    }

    #[test]
    fn test_grouped_conv_matches_per_group() {
        let mut table = SymbolTable::new();
        let x = Tensor::from_iter(&[1, 2, 3, 3], (0..18).map(|v| v as f32));
        // two groups of one channel each; weights [M=2, C/g=1, 1, 1]
        let w = Tensor::from_vec(&[2, 1, 1, 1], vec![1.0, -1.0]);
        table.insert("x", x.clone());
        table.insert("w", w);
        let node = Node::new("Conv", &["x", "w"], &["y"]).attr("group", 2_i64);
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[1, 2, 3, 3]);
        assert_eq!(y.at(&[0, 0, 0, 0]), x.at(&[0, 0, 0, 0]));
        assert_eq!(y.at(&[0, 1, 0, 0]), -x.at(&[0, 1, 0, 0]));
    }

    #[test]
    fn test_conv_kernel_shape_mismatch() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::ones(&[1, 1, 3, 3]));
        table.insert("w", Tensor::ones(&[1, 1, 2, 2]));
        let node = Node::new("Conv", &["x", "w"], &["y"])
            .attr("kernel_shape", vec![3_i64, 3]);
        let err = Lowering::new(7).lower(&node, &mut table).expect_err("");
        assert!(matches!(err, Error::UnsupportedConfiguration { .. }));
    }

    #[test]
    fn test_batch_normalization_inference() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_vec(&[1, 2, 1, 1], vec![1.0, 2.0]));
        table.insert("s", Tensor::new([1.0, 1.0]));
        table.insert("b", Tensor::new([0.0, 0.0]));
        table.insert("m", Tensor::new([1.0, 2.0]));
        table.insert("v", Tensor::new([1.0, 1.0]));
        let node = Node::new("BatchNormalization", &["x", "s", "b", "m", "v"], &["y"])
            .attr("is_test", 1_i64);
        run(&node, &mut table);
        // x equals the running mean, so the output is the bias
        assert!(Tensor::all_close(
            table.fetch("y"),
            &Tensor::zeros(&[1, 2, 1, 1]),
            1e-3
        ));
    }

    #[test]
    fn test_batch_normalization_training_warns_and_normalizes() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_vec(&[2, 1, 1, 1], vec![1.0, 3.0]));
        table.insert("s", Tensor::new([1.0]));
        table.insert("b", Tensor::new([0.0]));
        table.insert("m", Tensor::new([2.0]));
        table.insert("v", Tensor::new([1.0]));
        let node = Node::new("BatchNormalization", &["x", "s", "b", "m", "v"], &["y"])
            .attr("momentum", 1.0_f32);
        let cx = run(&node, &mut table);
        // the statistic-axis convention and the unpersisted blend are
        // reported, never fatal
        assert_eq!(cx.diags.warnings().len(), 1);
        // momentum 1.0 keeps the running statistics untouched
        assert!(Tensor::all_close(
            table.fetch("y"),
            &Tensor::from_vec(&[2, 1, 1, 1], vec![-1.0, 1.0]),
            1e-3
        ));
    }

    #[test]
    fn test_lrn_single_channel() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_vec(&[1, 1, 1, 1], vec![2.0]));
        let node = Node::new("LRN", &["x"], &["y"])
            .attr("alpha", 1.0_f32)
            .attr("beta", 1.0_f32)
            .attr("bias", 1.0_f32)
            .attr("size", 1_i64);
        run(&node, &mut table);
        // 2 / (1 + 1*4) = 0.4
        assert!((table.fetch("y").scalar_value() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_lstm_forward_shapes() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_scalar(&[5, 2, 3], 0.1));
        table.insert("w", Tensor::from_scalar(&[1, 8, 3], 0.1));
        table.insert("r", Tensor::from_scalar(&[1, 8, 2], 0.1));
        let node = Node::new("LSTM", &["x", "w", "r"], &["y", "h", "c"])
            .attr("hidden_size", 2_i64);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").extents(), &[5, 1, 2, 2]);
        assert_eq!(table.fetch("h").extents(), &[1, 2, 2]);
        assert_eq!(table.fetch("c").extents(), &[1, 2, 2]);
    }

    #[test]
    fn test_lstm_bidirectional_shapes_and_activation_warning() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_scalar(&[4, 1, 3], 0.1));
        table.insert("w", Tensor::from_scalar(&[2, 8, 3], 0.1));
        table.insert("r", Tensor::from_scalar(&[2, 8, 2], 0.1));
        let node = Node::new("LSTM", &["x", "w", "r"], &["y", "h", "c"])
            .attr("hidden_size", 2_i64)
            .attr("direction", "bidirectional")
            .attr("activations", vec!["Relu", "Tanh", "Tanh", "Sigmoid", "Tanh", "Tanh"]);
        let cx = run(&node, &mut table);
        assert_eq!(table.fetch("y").extents(), &[4, 2, 1, 2]);
        assert_eq!(table.fetch("h").extents(), &[2, 1, 2]);
        assert_eq!(cx.diags.warnings().len(), 1);
    }

    #[test]
    fn test_dropout_test_mode_is_identity() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([1.0, 2.0, 3.0]));
        let node = Node::new("Dropout", &["x"], &["y"]).attr("is_test", 1_i64);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_leaky_relu_warns_without_alpha() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([-1.0, 2.0]));
        let cx = run(&Node::new("LeakyRelu", &["x"], &["y"]), &mut table);
        assert!(!cx.diags.is_empty());
        assert_eq!(table.fetch("y").to_vec(), vec![-0.01, 2.0]);
    }

    #[test]
    fn test_selu_always_warns() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([0.0]));
        let cx = run(&Node::new("Selu", &["x"], &["y"]), &mut table);
        assert_eq!(cx.diags.warnings().len(), 1);
    }

    #[test]
    fn test_thresholded_relu() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([0.5, 1.5, -2.0]));
        let node = Node::new("ThresholdedRelu", &["x"], &["y"]).attr("alpha", 1.0_f32);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").to_vec(), vec![0.0, 1.5, 0.0]);
    }

    #[test]
    fn test_p_relu() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_vec(&[1, 2], vec![-2.0, 3.0]));
        table.insert("slope", Tensor::new([0.5, 0.5]));
        run(&Node::new("PRelu", &["x", "slope"], &["y"]), &mut table);
        assert_eq!(table.fetch("y").to_vec(), vec![-1.0, 3.0]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[2, 3], (0..6).map(|v| v as f32)));
        run(&Node::new("Softmax", &["x"], &["y"]), &mut table);
        let y = table.fetch("y");
        let row0: f32 = (0..3).map(|j| y.at(&[0, j])).sum();
        assert!((row0 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_shift_invariance() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([[1.0, 2.0, 3.0]]));
        table.insert("xs", Tensor::new([[101.0, 102.0, 103.0]]));
        run(&Node::new("Softmax", &["x"], &["y"]), &mut table);
        run(&Node::new("Softmax", &["xs"], &["ys"]), &mut table);
        assert!(Tensor::all_close(table.fetch("y"), table.fetch("ys"), 1e-6));
    }

    #[test]
    fn test_softmax_axis_collapse() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::ones(&[2, 2, 2]));
        let node = Node::new("Softmax", &["x"], &["y"]).attr("axis", 2_i64);
        run(&node, &mut table);
        // axis 2 leaves rows of length 2, all equal -> every entry 0.5
        assert!(Tensor::all_close(
            table.fetch("y"),
            &Tensor::from_scalar(&[2, 2, 2], 0.5),
            1e-6
        ));
    }

    #[test]
    fn test_hardmax() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([[1.0, 3.0, 2.0]]));
        run(&Node::new("Hardmax", &["x"], &["y"]), &mut table);
        assert_eq!(table.fetch("y").to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_random_uniform_like_bounds_and_type() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::zeros(&[2, 3]));
        let node = Node::new("RandomUniformLike", &["x"], &["y"])
            .attr("dtype", 1_i64)
            .attr("low", 5.0_f32)
            .attr("high", 6.0_f32)
            .attr("seed", 42.0_f32);
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[2, 3]);
        assert_eq!(y.data_type(), DataType::Float);
        assert!(y.iter().all(|v| (5.0..6.0).contains(&v)));
    }

    #[test]
    fn test_random_normal_like_seed_is_deterministic() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::zeros(&[8]));
        let node = Node::new("RandomNormalLike", &["x"], &["y"])
            .attr("dtype", 1_i64)
            .attr("seed", 7.0_f32);
        run(&node, &mut table);
        let first = table.fetch("y").to_vec();
        run(&node.clone().named("again"), &mut table);
        assert_eq!(table.fetch("y").to_vec(), first);
    }
}
