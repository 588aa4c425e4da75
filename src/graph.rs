use std::collections::HashMap;

use crate::error::Error;
use crate::tensor::Tensor;

/// Embedded constant payload: flat values plus the interchange element
/// type code and dims, exactly as the format serializes them.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorPayload {
    pub element_type: i64,
    pub dims: Vec<usize>,
    pub values: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f32),
    Floats(Vec<f32>),
    Str(String),
    Strs(Vec<String>),
    Tensor(TensorPayload),
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Ints(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(v: Vec<f32>) -> Self {
        AttrValue::Floats(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<Vec<&str>> for AttrValue {
    fn from(v: Vec<&str>) -> Self {
        AttrValue::Strs(v.into_iter().map(str::to_string).collect())
    }
}

impl From<TensorPayload> for AttrValue {
    fn from(v: TensorPayload) -> Self {
        AttrValue::Tensor(v)
    }
}

/// One interchange-format operator instance. Immutable once constructed;
/// the host graph owns it for exactly one lowering pass.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub attrs: HashMap<String, AttrValue>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Node {
    pub fn new(op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Node {
            name: format!("{}:{}", op_type, outputs.first().copied().unwrap_or("?")),
            op_type: op_type.to_string(),
            attrs: HashMap::new(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    fn required(&self, key: &str) -> Result<&AttrValue, Error> {
        self.attrs
            .get(key)
            .ok_or_else(|| Error::missing_attribute(&self.name, key))
    }

    fn malformed(&self, key: &str) -> Error {
        // wrong attribute kind reads the same as an absent one: the graph
        // does not carry what the rule needs
        Error::missing_attribute(&self.name, key)
    }

    pub fn attr_int(&self, key: &str) -> Result<i64, Error> {
        match self.required(key)? {
            AttrValue::Int(v) => Ok(*v),
            _ => Err(self.malformed(key)),
        }
    }

    pub fn attr_int_or(&self, key: &str, default: i64) -> i64 {
        match self.attrs.get(key) {
            Some(AttrValue::Int(v)) => *v,
            _ => default,
        }
    }

    pub fn attr_ints(&self, key: &str) -> Result<Vec<i64>, Error> {
        match self.required(key)? {
            AttrValue::Ints(v) => Ok(v.clone()),
            _ => Err(self.malformed(key)),
        }
    }

    pub fn attr_ints_or(&self, key: &str, default: &[i64]) -> Vec<i64> {
        match self.attrs.get(key) {
            Some(AttrValue::Ints(v)) => v.clone(),
            _ => default.to_vec(),
        }
    }

    pub fn attr_float(&self, key: &str) -> Result<f32, Error> {
        match self.required(key)? {
            AttrValue::Float(v) => Ok(*v),
            _ => Err(self.malformed(key)),
        }
    }

    pub fn attr_float_or(&self, key: &str, default: f32) -> f32 {
        match self.attrs.get(key) {
            Some(AttrValue::Float(v)) => *v,
            _ => default,
        }
    }

    pub fn attr_str(&self, key: &str) -> Result<String, Error> {
        match self.required(key)? {
            AttrValue::Str(v) => Ok(v.clone()),
            _ => Err(self.malformed(key)),
        }
    }

    pub fn attr_str_or(&self, key: &str, default: &str) -> String {
        match self.attrs.get(key) {
            Some(AttrValue::Str(v)) => v.clone(),
            _ => default.to_string(),
        }
    }

    pub fn attr_strs(&self, key: &str) -> Result<Vec<String>, Error> {
        match self.required(key)? {
            AttrValue::Strs(v) => Ok(v.clone()),
            _ => Err(self.malformed(key)),
        }
    }

    pub fn attr_tensor(&self, key: &str) -> Result<&TensorPayload, Error> {
        match self.required(key)? {
            AttrValue::Tensor(v) => Ok(v),
            _ => Err(self.malformed(key)),
        }
    }
}

/// Name-to-lowered-tensor mapping for a single graph pass. Append-only;
/// the walker guarantees every referenced input was produced earlier, so
/// a missing entry is a walker bug, not a graph error.
#[derive(Default)]
pub struct SymbolTable {
    entries: HashMap<String, Tensor>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn insert(&mut self, name: &str, tensor: Tensor) {
        self.entries.insert(name.to_string(), tensor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn fetch(&self, name: &str) -> &Tensor {
        match self.entries.get(name) {
            Some(t) => t,
            None => panic!("tensor '{}' has not been lowered yet", name),
        }
    }
}
