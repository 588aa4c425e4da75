//! The execution-oriented operator vocabulary the lowering engine targets:
//! eager, channel-first-or-last, VALID-padding primitives over host tensors.

pub mod conv;
pub mod layout;
pub mod linalg;
pub mod map;
pub mod pool;
pub mod reduce;
pub mod rnn;
