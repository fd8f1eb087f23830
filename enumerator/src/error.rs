use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnumeratorError {
    #[error("{0} name counter exhausted")]
    Exhausted(crate::DeviceKind),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnumeratorError {
    /// True when the snapshot could not be read or written.
    pub fn is_persistence(&self) -> bool {
        matches!(self, EnumeratorError::Io(_) | EnumeratorError::Serialization(_))
    }
}
