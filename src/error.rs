use std::error::Error;
use std::fmt;

use burn::record::RecorderError;

#[derive(Debug)]
pub enum SwarmError {
    /// Leader/follower layout does not match the requested agent count
    ShapeMismatch { expected: usize, actual: usize },
    /// Reading or writing a checkpoint failed
    Checkpoint { path: String, source: RecorderError },
    /// A configuration value could not be used
    InvalidConfig { key: String, value: String },
    /// Filesystem access around checkpoints failed
    Io { path: String, source: std::io::Error },
}

impl fmt::Display for SwarmError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SwarmError::ShapeMismatch { expected, actual } => {
                write!(
                    formatter,
                    "Formation shape mismatch (expected {} positions, got {})",
                    expected, actual
                )
            }
            SwarmError::Checkpoint { path, source } => {
                write!(formatter, "Checkpoint {} failed: {:?}", path, source)
            }
            SwarmError::InvalidConfig { key, value } => {
                write!(formatter, "Invalid value {:?} for {}", value, key)
            }
            SwarmError::Io { path, source } => {
                write!(formatter, "I/O error at {}: {}", path, source)
            }
        }
    }
}

impl Error for SwarmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SwarmError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
