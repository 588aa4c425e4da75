//! portage translates tensor-computation graphs expressed in a portable,
//! versioned interchange vocabulary into an eager tensor engine's
//! vocabulary.
//!
//! The pieces:
//! - [`graph`]: the interchange data model (nodes, typed attributes,
//!   embedded constants, the symbol table of lowered tensors).
//! - [`dispatch`]: the per-operator, per-version rule table.
//! - [`lower`]: the rules themselves, plus the pass context carrying the
//!   acceleration flag and the diagnostics channel.
//! - [`layout`]: channel-first storage vs. channel-last compute decisions.
//! - [`fallback`]: the portable pooling evaluator for padding policies the
//!   engine cannot express natively.
//! - [`engine`], [`tensor`], [`shape`]: the execution target, an eager CPU
//!   strided-tensor library.
//!
//! ```
//! use portage::{Lowering, Node, SymbolTable, Tensor};
//!
//! let mut table = SymbolTable::new();
//! table.insert("x", Tensor::new([1.0, -2.0, 3.0]));
//!
//! let mut pass = Lowering::new(7);
//! pass.lower(&Node::new("Relu", &["x"], &["y"]), &mut table).unwrap();
//! assert_eq!(table.fetch("y").to_vec(), vec![1.0, 0.0, 3.0]);
//! ```

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod frontend;
pub mod graph;
pub mod layout;
pub mod lower;
pub mod mapping;
pub mod shape;
pub mod tensor;

pub use error::Error;
pub use graph::{AttrValue, Node, SymbolTable, TensorPayload};
pub use lower::{Diagnostics, Lowering, Warning};
pub use tensor::{DataType, Tensor};
