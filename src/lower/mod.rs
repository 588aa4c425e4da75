//! Per-operator lowering rules and the pass context they share.
//!
//! Each rule reconciles one interchange operator's conventions (defaults,
//! auto-padding, broadcast axes, layout) with the engine's vocabulary and
//! returns the node's output tensors in declaration order. Rules are split
//! by family: `math`, `nn`, `shaping`.

pub mod math;
pub mod nn;
pub mod shaping;

use crate::dispatch;
use crate::error::Error;
use crate::graph::{Node, SymbolTable};
use crate::layout::{self, LayoutPair};
use crate::tensor::Tensor;

/// One rule: reads the node's inputs from the table, returns its outputs.
/// Rules never write the table themselves; the pass does, keeping output
/// naming in one place.
pub type Handler = fn(&Node, &SymbolTable, &mut Lowering) -> Result<Vec<Tensor>, Error>;

/// A best-effort divergence: the node was lowered, but not exactly.
#[derive(Clone, Debug)]
pub struct Warning {
    pub node: String,
    pub message: String,
}

/// Collects warnings for the caller to inspect after the pass. Divergences
/// never alter control flow; fatal conditions go through `Error` instead.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn push(&mut self, node: &str, message: impl Into<String>) {
        self.warnings.push(Warning {
            node: node.to_string(),
            message: message.into(),
        });
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// State of one lowering pass: the requested operator-set version, the
/// acceleration capability of the execution target, and the diagnostics
/// sink.
pub struct Lowering {
    opset_version: i64,
    accel: bool,
    pub diags: Diagnostics,
}

impl Lowering {
    pub fn new(opset_version: i64) -> Self {
        Lowering {
            opset_version,
            accel: false,
            diags: Diagnostics::default(),
        }
    }

    pub fn with_acceleration(mut self, accel: bool) -> Self {
        self.accel = accel;
        self
    }

    pub fn opset_version(&self) -> i64 {
        self.opset_version
    }

    /// Storage/compute layout decision for a tensor of the given rank.
    pub fn layout(&self, rank: usize) -> LayoutPair {
        layout::resolve(rank, self.accel)
    }

    pub fn warn(&mut self, node: &Node, message: impl Into<String>) {
        self.diags.push(&node.name, message);
    }

    /// Lowers one node and binds its outputs in the table.
    pub fn lower(&mut self, node: &Node, table: &mut SymbolTable) -> Result<(), Error> {
        let handler = dispatch::resolve(node, self.opset_version)?;
        let outputs = handler(node, table, self)?;
        for (name, tensor) in node.outputs.iter().zip(outputs) {
            table.insert(name, tensor);
        }
        Ok(())
    }

    /// Lowers a topologically-ordered node list against a pre-seeded table.
    pub fn lower_graph(&mut self, nodes: &[Node], table: &mut SymbolTable) -> Result<(), Error> {
        for node in nodes {
            self.lower(node, table)?;
        }
        Ok(())
    }
}

pub(crate) fn usizes(values: &[i64]) -> Vec<usize> {
    values.iter().map(|&v| v as usize).collect()
}

/// Reshapes a lower-rank operand so its axes land at `axis` of a rank-`rank`
/// tensor, with size-1 axes everywhere else. Trailing alignment is then the
/// engine's ordinary broadcast.
pub(crate) fn explicit_broadcast(y: &Tensor, axis: usize, rank: usize) -> Tensor {
    let mut extents = vec![1; axis];
    extents.extend_from_slice(y.extents());
    extents.resize(rank, 1);
    y.view(&extents)
}
