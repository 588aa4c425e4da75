//! Raising: the nominal reverse direction, turning an engine-side reshape
//! back into an interchange node. Kept deliberately narrow; lowering is the
//! crate's job, raising exists so round-trip tooling has a seam to grow
//! from.

use crate::graph::Node;

/// Builds an interchange reshape node for an engine view operation.
pub fn raise_reshape(input: &str, output: &str, extents: &[usize]) -> Node {
    let shape: Vec<i64> = extents.iter().map(|&e| e as i64).collect();
    Node::new("Reshape", &[input], &[output])
        .named(output)
        .attr("shape", shape)
}
