use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Template node not found: {node}")]
    NodeNotFound { node: String },

    #[error("Template node {node} has no inputs object")]
    MalformedNode { node: String },

    #[error("Template is not a valid JSON object: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Template storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),
}
