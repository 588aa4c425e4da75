use crate::shape::ShapeError;

/// Fatal lowering failures. Divergences that still admit a best-effort
/// translation are not errors; they flow through the diagnostics channel.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("node '{node}': missing required attribute '{attr}'")]
    MissingAttribute { node: String, attr: String },

    #[error("node '{node}': no lowering rule registered for '{op}' at version {version}")]
    UnsupportedVersion {
        node: String,
        op: String,
        version: i64,
    },

    #[error("node '{node}': unsupported configuration: {reason}")]
    UnsupportedConfiguration { node: String, reason: String },

    #[error("shape error")]
    Shape(#[from] ShapeError),
}

impl Error {
    pub fn missing_attribute(node: &str, attr: &str) -> Self {
        Error::MissingAttribute {
            node: node.to_string(),
            attr: attr.to_string(),
        }
    }

    pub fn unsupported(node: &str, reason: impl Into<String>) -> Self {
        Error::UnsupportedConfiguration {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}
