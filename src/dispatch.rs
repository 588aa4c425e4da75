//! Operator/version dispatch. Each interchange operator registers the
//! versions at which its semantics (or attribute set) changed; resolution
//! picks the highest registered version not above the requested one, so a
//! graph stamped with a newer operator set keeps using the latest rule that
//! predates it.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::Error;
use crate::graph::{Node, SymbolTable};
use crate::lower::{math, nn, shaping, Handler, Lowering};
use crate::mapping;
use crate::tensor::Tensor;

const RULES: &[(&str, i64, Handler)] = &[
    ("Add", 1, math::add),
    ("And", 1, math::and),
    ("ArgMax", 1, math::arg_max),
    ("ArgMin", 1, math::arg_min),
    ("AveragePool", 1, nn::average_pool),
    ("BatchNormalization", 1, nn::batch_normalization),
    ("Clip", 1, math::clip),
    ("Concat", 1, shaping::concat),
    ("Constant", 1, shaping::constant),
    ("Conv", 1, nn::conv),
    ("ConvTranspose", 1, nn::conv_transpose),
    ("DepthToSpace", 1, shaping::depth_to_space),
    ("Div", 1, math::div),
    ("Dropout", 1, nn::dropout),
    ("Elu", 1, nn::elu),
    ("Equal", 1, math::equal),
    ("Flatten", 1, shaping::flatten),
    ("Gemm", 1, math::gemm),
    ("GlobalAveragePool", 1, nn::global_average_pool),
    ("GlobalLpPool", 1, nn::global_lp_pool),
    ("GlobalMaxPool", 1, nn::global_max_pool),
    ("Greater", 1, math::greater),
    ("HardSigmoid", 1, nn::hard_sigmoid),
    ("Hardmax", 1, nn::hardmax),
    ("LRN", 1, nn::lrn),
    ("LSTM", 1, nn::lstm),
    ("LeakyRelu", 1, nn::leaky_relu),
    ("Less", 1, math::less),
    ("LogSoftmax", 1, nn::log_softmax),
    ("LpNormalization", 1, math::lp_normalization),
    ("MatMul", 1, math::mat_mul),
    ("Max", 1, math::max_variadic),
    ("MaxPool", 1, nn::max_pool),
    ("Mean", 1, math::mean_variadic),
    ("Min", 1, math::min_variadic),
    ("Mul", 1, math::mul),
    ("Or", 1, math::or),
    ("PRelu", 1, nn::p_relu),
    // version 2 renamed the padding attribute and made the mode optional
    ("Pad", 1, shaping::pad_v1),
    ("Pad", 2, shaping::pad_v2),
    ("Pow", 1, math::pow),
    ("RandomNormalLike", 1, nn::random_normal_like),
    ("RandomUniformLike", 1, nn::random_uniform_like),
    ("ReduceL1", 1, math::reduce_l1),
    ("ReduceLogSumExp", 1, math::reduce_log_sum_exp),
    ("ReduceMax", 1, math::reduce_max),
    ("ReduceMean", 1, math::reduce_mean),
    ("ReduceMin", 1, math::reduce_min),
    ("ReduceProd", 1, math::reduce_prod),
    ("ReduceSum", 1, math::reduce_sum),
    ("ReduceSumSquare", 1, math::reduce_sum_square),
    ("Reshape", 1, shaping::reshape),
    ("Selu", 1, nn::selu),
    ("Slice", 1, shaping::slice),
    ("Softmax", 1, nn::softmax),
    ("SpaceToDepth", 1, shaping::space_to_depth),
    ("Split", 1, shaping::split),
    ("Squeeze", 1, shaping::squeeze),
    ("Sub", 1, math::sub),
    ("Sum", 1, math::sum_variadic),
    ("ThresholdedRelu", 1, nn::thresholded_relu),
    ("Tile", 1, shaping::tile),
    ("TopK", 1, math::top_k),
    ("Transpose", 1, shaping::transpose),
    ("Unsqueeze", 1, shaping::unsqueeze),
    ("Xor", 1, math::xor),
];

lazy_static! {
    static ref TABLE: HashMap<&'static str, Vec<(i64, Handler)>> = {
        let mut table: HashMap<&'static str, Vec<(i64, Handler)>> = HashMap::new();
        for &(op, version, handler) in RULES {
            table.entry(op).or_default().push((version, handler));
        }
        for versions in table.values_mut() {
            versions.sort_by_key(|&(v, _)| v);
        }
        table
    };
}

/// Picks the rule for the node's operator under the requested operator-set
/// version, or the trivial rename table at version 1 when no dedicated rule
/// exists. A miss is fatal and names the node it occurred at.
pub fn resolve(node: &Node, version: i64) -> Result<Handler, Error> {
    if version >= 1 {
        if let Some(versions) = TABLE.get(node.op_type.as_str()) {
            if let Some(&(_, handler)) = versions.iter().filter(|&&(v, _)| v <= version).last() {
                return Ok(handler);
            }
        }
        if mapping::trivial(&node.op_type).is_some() {
            return Ok(run_trivial);
        }
    }
    Err(Error::UnsupportedVersion {
        node: node.name.clone(),
        op: node.op_type.clone(),
        version,
    })
}

fn run_trivial(node: &Node, table: &SymbolTable, _cx: &mut Lowering) -> Result<Vec<Tensor>, Error> {
    let f = mapping::trivial(&node.op_type).ok_or_else(|| Error::UnsupportedVersion {
        node: node.name.clone(),
        op: node.op_type.clone(),
        version: 1,
    })?;
    Ok(vec![f(table.fetch(&node.inputs[0]))])
}
