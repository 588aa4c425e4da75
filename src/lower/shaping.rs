//! Structural rules: concatenation, reshaping, slicing, padding and the
//! block rearrangement pair.

use crate::engine::layout::{self, PadMode};
use crate::error::Error;
use crate::graph::{Node, SymbolTable};
use crate::layout::{perm_between, DataFormat};
use crate::lower::{usizes, Lowering};
use crate::mapping;
use crate::shape::{axis_to_usize, axes_to_arr, infer_extents};
use crate::tensor::Tensor;

pub fn concat(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let values: Vec<Tensor> = node
        .inputs
        .iter()
        .map(|n| table.fetch(n).contiguous())
        .collect();
    let axis = axis_to_usize(node.attr_int_or("axis", 1) as isize, values[0].rank())?;
    Ok(vec![layout::concat(&values, axis)])
}

/// Materializes an embedded constant payload.
pub fn constant(node: &Node, _table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let payload = node.attr_tensor("value")?;
    let data_type = mapping::element_type(payload.element_type).ok_or_else(|| {
        Error::unsupported(
            &node.name,
            format!("unknown element type code {}", payload.element_type),
        )
    })?;
    Ok(vec![
        Tensor::from_vec(&payload.dims, payload.values.clone()).as_type(data_type),
    ])
}

fn rearrange(
    node: &Node,
    table: &SymbolTable,
    cx: &mut Lowering,
    f: fn(&Tensor, usize, DataFormat) -> Tensor,
) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let block = node.attr_int("blocksize")? as usize;
    let rank = x.rank();
    let lp = cx.layout(rank);
    let y = if lp.needs_transform() {
        let to = perm_between(lp.storage, lp.compute, rank);
        let from = perm_between(lp.compute, lp.storage, rank);
        f(&x.permute(&to).contiguous(), block, lp.compute)
            .permute(&from)
            .contiguous()
    } else {
        f(x, block, lp.compute)
    };
    Ok(vec![y])
}

pub fn depth_to_space(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    rearrange(node, table, cx, layout::depth_to_space)
}

pub fn space_to_depth(node: &Node, table: &SymbolTable, cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    rearrange(node, table, cx, layout::space_to_depth)
}

pub fn flatten(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let axis = node.attr_int_or("axis", 1) as usize;
    let rows: usize = x.extents()[..axis].iter().product();
    let cols: usize = x.extents()[axis..].iter().product();
    Ok(vec![x.view(&[rows, cols])])
}

fn pad_impl(node: &Node, table: &SymbolTable, pads_attr: &str, mode: &str) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let raw = usizes(&node.attr_ints(pads_attr)?);
    let n = raw.len() / 2;
    let pairs: Vec<(usize, usize)> = (0..n).map(|i| (raw[i], raw[n + i])).collect();
    let mode = match mode.to_lowercase().as_str() {
        "constant" => PadMode::Constant(node.attr_float_or("value", 0.0)),
        "reflect" => PadMode::Reflect,
        "edge" => PadMode::Edge,
        other => {
            return Err(Error::unsupported(
                &node.name,
                format!("unknown pad mode '{}'", other),
            ))
        }
    };
    Ok(vec![layout::pad(x, &pairs, mode)])
}

pub fn pad_v1(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let mode = node.attr_str("mode")?;
    pad_impl(node, table, "paddings", &mode)
}

pub fn pad_v2(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let mode = node.attr_str_or("mode", "constant");
    pad_impl(node, table, "pads", &mode)
}

pub fn reshape(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let signed: Vec<isize> = node
        .attr_ints("shape")?
        .iter()
        .map(|&v| v as isize)
        .collect();
    let extents = infer_extents(&signed, x.size())?;
    Ok(vec![x.view(&extents)])
}

/// Per-axis clamped slicing; negative ends count from the axis extent, and
/// a start past the clamped end yields an empty result rather than an
/// error.
pub fn slice(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let rank = x.rank();
    let starts = node.attr_ints("starts")?;
    let ends = node.attr_ints("ends")?;
    let axes = node.attr_ints_or("axes", &(0..starts.len() as i64).collect::<Vec<_>>());

    let mut y = x.clone();
    for ((&s, &e), &a) in starts.iter().zip(&ends).zip(&axes) {
        let axis = axis_to_usize(a as isize, rank)?;
        let size = y.extent(axis) as i64;
        let end = if e < 0 { size + e } else { e }.min(size);
        let start = s.max(0).min(size);
        let end = end.max(start);
        y = y.slice(start as usize, end as usize, axis);
    }
    Ok(vec![y.contiguous()])
}

pub fn split(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let axis = axis_to_usize(node.attr_int("axis")? as isize, x.rank())?;
    let sizes: Vec<usize> = if node.has_attr("split") {
        usizes(&node.attr_ints("split")?)
    } else if node.inputs.len() > 1 {
        table.fetch(&node.inputs[1]).iter().map(|v| v as usize).collect()
    } else {
        let parts = node.outputs.len();
        vec![x.extent(axis) / parts; parts]
    };
    Ok(layout::split(x, &sizes, axis)
        .into_iter()
        .map(|t| t.contiguous())
        .collect())
}

pub fn squeeze(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let mut axes: Vec<usize> = if node.has_attr("axes") {
        let signed: Vec<isize> = node.attr_ints("axes")?.iter().map(|&a| a as isize).collect();
        axes_to_arr(&signed, x.rank())?.to_vec()
    } else {
        x.extents()
            .iter()
            .enumerate()
            .filter(|(_, &e)| e == 1)
            .map(|(i, _)| i)
            .collect()
    };
    axes.sort_unstable();
    let mut y = x.clone();
    for &axis in axes.iter().rev() {
        y = y.squeeze_axis(axis);
    }
    Ok(vec![y])
}

/// Single-axis repetition: the axis and repeat count arrive as scalar
/// operands.
pub fn tile(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let axis = table.fetch(&node.inputs[1]).scalar_value() as usize;
    let tiles = table.fetch(&node.inputs[2]).scalar_value() as usize;
    let mut multiples = vec![1; x.rank()];
    multiples[axis] = tiles;
    Ok(vec![layout::tile(x, &multiples)])
}

pub fn transpose(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let perm: Vec<usize> = if node.has_attr("perm") {
        usizes(&node.attr_ints("perm")?)
    } else {
        (0..x.rank()).rev().collect()
    };
    Ok(vec![x.permute(&perm).contiguous()])
}

pub fn unsqueeze(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let x = table.fetch(&node.inputs[0]);
    let mut axes = usizes(&node.attr_ints("axes")?);
    axes.sort_unstable();
    let mut y = x.clone();
    for &axis in &axes {
        y = y.expand_axis(axis);
    }
    Ok(vec![y])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TensorPayload;
    use crate::lower::Lowering;
    use crate::tensor::DataType;

    fn run(node: &Node, table: &mut SymbolTable) {
        Lowering::new(7).lower(node, table).unwrap();
    }

    #[test]
    fn test_concat_default_axis() {
        let mut table = SymbolTable::new();
        table.insert("a", Tensor::new([[1.0], [3.0]]));
        table.insert("b", Tensor::new([[2.0], [4.0]]));
        run(&Node::new("Concat", &["a", "b"], &["y"]), &mut table);
        assert_eq!(table.fetch("y").extents(), &[2, 2]);
        assert_eq!(table.fetch("y").to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_constant_payload() {
        let mut table = SymbolTable::new();
        let payload = TensorPayload {
            element_type: 7,
            dims: vec![2, 2],
            values: vec![1.0, 2.0, 3.0, 4.0],
        };
        let node = Node::new("Constant", &[], &["y"]).attr("value", payload);
        run(&node, &mut table);
        let y = table.fetch("y");
        assert_eq!(y.extents(), &[2, 2]);
        assert_eq!(y.data_type(), DataType::Long);
    }

    #[test]
    fn test_constant_unknown_type_code() {
        let mut table = SymbolTable::new();
        let payload = TensorPayload {
            element_type: 8, // strings are not lowerable
            dims: vec![1],
            values: vec![0.0],
        };
        let node = Node::new("Constant", &[], &["y"]).attr("value", payload);
        let err = Lowering::new(7).lower(&node, &mut table).expect_err("");
        assert!(matches!(err, Error::UnsupportedConfiguration { .. }));
    }

    #[test]
    fn test_depth_space_round_trip() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[1, 4, 2, 2], (0..16).map(|v| v as f32)));
        let d2s = Node::new("DepthToSpace", &["x"], &["y"]).attr("blocksize", 2_i64);
        let s2d = Node::new("SpaceToDepth", &["y"], &["z"]).attr("blocksize", 2_i64);
        run(&d2s, &mut table);
        run(&s2d, &mut table);
        assert_eq!(table.fetch("y").extents(), &[1, 1, 4, 4]);
        assert!(Tensor::all_equal(table.fetch("z"), table.fetch("x")));
    }

    #[test]
    fn test_flatten() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::zeros(&[2, 3, 4]));
        run(&Node::new("Flatten", &["x"], &["y"]), &mut table);
        assert_eq!(table.fetch("y").extents(), &[2, 12]);
    }

    #[test]
    fn test_pad_versions() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([[1.0, 2.0]]));

        let v1 = Node::new("Pad", &["x"], &["y1"])
            .attr("mode", "constant")
            .attr("paddings", vec![0_i64, 1, 0, 1])
            .attr("value", 9.0_f32);
        Lowering::new(1).lower(&v1, &mut table).unwrap();
        assert_eq!(table.fetch("y1").to_vec(), vec![9.0, 1.0, 2.0, 9.0]);

        let v2 = Node::new("Pad", &["x"], &["y2"]).attr("pads", vec![0_i64, 1, 0, 1]);
        Lowering::new(7).lower(&v2, &mut table).unwrap();
        assert_eq!(table.fetch("y2").to_vec(), vec![0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_pad_unknown_mode() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([1.0]));
        let node = Node::new("Pad", &["x"], &["y"])
            .attr("mode", "wrap")
            .attr("pads", vec![1_i64, 1]);
        let err = Lowering::new(7).lower(&node, &mut table).expect_err("");
        assert!(matches!(err, Error::UnsupportedConfiguration { .. }));
    }

    #[test]
    fn test_reshape_with_inference() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[24], (0..24).map(|v| v as f32)));
        let node = Node::new("Reshape", &["x"], &["y"]).attr("shape", vec![2_i64, -1, 4]);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").extents(), &[2, 3, 4]);
    }

    #[test]
    fn test_slice_negative_end() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([0.0, 1.0, 2.0, 3.0]));
        let node = Node::new("Slice", &["x"], &["y"])
            .attr("starts", vec![1_i64])
            .attr("ends", vec![-1_i64]);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_slice_clamps_to_empty() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([0.0, 1.0, 2.0, 3.0]));
        let node = Node::new("Slice", &["x"], &["y"])
            .attr("starts", vec![5_i64])
            .attr("ends", vec![-1_i64]);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").extents(), &[0]);
    }

    #[test]
    fn test_split_equal_by_outputs() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[4, 2], (0..8).map(|v| v as f32)));
        let node = Node::new("Split", &["x"], &["a", "b"]).attr("axis", 0_i64);
        run(&node, &mut table);
        assert_eq!(table.fetch("a").extents(), &[2, 2]);
        assert_eq!(table.fetch("b").at(&[1, 1]), 7.0);
    }

    #[test]
    fn test_split_sizes_attr() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::from_iter(&[5], (0..5).map(|v| v as f32)));
        let node = Node::new("Split", &["x"], &["a", "b"])
            .attr("axis", 0_i64)
            .attr("split", vec![2_i64, 3]);
        run(&node, &mut table);
        assert_eq!(table.fetch("a").to_vec(), vec![0.0, 1.0]);
        assert_eq!(table.fetch("b").to_vec(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_squeeze_default_axes() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::zeros(&[1, 3, 1, 2]));
        run(&Node::new("Squeeze", &["x"], &["y"]), &mut table);
        assert_eq!(table.fetch("y").extents(), &[3, 2]);
    }

    #[test]
    fn test_tile_single_axis() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::new([[1.0, 2.0]]));
        table.insert("axis", Tensor::scalar(1.0));
        table.insert("n", Tensor::scalar(2.0));
        run(&Node::new("Tile", &["x", "axis", "n"], &["y"]), &mut table);
        assert_eq!(table.fetch("y").to_vec(), vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_transpose_default_reverses() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::zeros(&[2, 3, 4]));
        run(&Node::new("Transpose", &["x"], &["y"]), &mut table);
        assert_eq!(table.fetch("y").extents(), &[4, 3, 2]);
    }

    #[test]
    fn test_unsqueeze_sorted_axes() {
        let mut table = SymbolTable::new();
        table.insert("x", Tensor::zeros(&[3, 4]));
        let node = Node::new("Unsqueeze", &["x"], &["y"]).attr("axes", vec![2_i64, 0]);
        run(&node, &mut table);
        assert_eq!(table.fetch("y").extents(), &[1, 3, 1, 4]);
    }
}
