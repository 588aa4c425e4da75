//! Static vocabulary tables: interchange element-type codes and the
//! one-to-one operator renames that need no dedicated lowering rule.

use crate::engine::map;
use crate::tensor::{DataType, Tensor};

/// Decodes an interchange element-type code. Unknown codes return None
/// and the caller decides how fatal that is.
pub fn element_type(code: i64) -> Option<DataType> {
    match code {
        1 => Some(DataType::Float),
        2 => Some(DataType::Uchar),
        3 => Some(DataType::Char),
        4 => Some(DataType::Ushort),
        5 => Some(DataType::Short),
        6 => Some(DataType::Int),
        7 => Some(DataType::Long),
        9 => Some(DataType::Bool),
        10 => Some(DataType::Half),
        11 => Some(DataType::Double),
        12 => Some(DataType::Uint),
        13 => Some(DataType::Ulong),
        _ => None,
    }
}

pub type UnaryFn = fn(&Tensor) -> Tensor;

/// Operators whose lowering is a plain rename onto a native unary.
/// These are served at version 1 whenever no dedicated rule matches.
pub const TRIVIAL_OPS: &[(&str, UnaryFn)] = &[
    ("Abs", map::abs),
    ("Ceil", map::ceil),
    ("Exp", map::exp),
    ("Floor", map::floor),
    ("Identity", map::identity),
    ("Log", map::log),
    ("Neg", map::neg),
    ("Not", map::logical_not),
    ("Reciprocal", map::reciprocal),
    ("Relu", map::relu),
    ("Sigmoid", map::sigmoid),
    ("Softplus", map::softplus),
    ("Softsign", map::softsign),
    ("Sqrt", map::sqrt),
    ("Tanh", map::tanh),
];

pub fn trivial(op_type: &str) -> Option<UnaryFn> {
    TRIVIAL_OPS
        .iter()
        .find(|(name, _)| *name == op_type)
        .map(|(_, f)| *f)
}
