use std::error::Error;
use std::fmt;

pub type Result<T> = std::result::Result<T, WorldError>;

#[derive(Debug)]
pub enum WorldError {
    IoError(std::io::Error),
    /// Bad magic, version mismatch, truncated or otherwise malformed data.
    FormatError(String),
    CompressionError(String),
    ConfigError(String),
    /// A compressed chunk needs more sectors than a location entry can describe.
    ChunkTooLarge { sectors: usize },
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::IoError(err) => write!(f, "IO error: {}", err),
            WorldError::FormatError(msg) => write!(f, "Format error: {}", msg),
            WorldError::CompressionError(msg) => write!(f, "Compression error: {}", msg),
            WorldError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            WorldError::ChunkTooLarge { sectors } => {
                write!(f, "Chunk needs {} sectors, at most 255 fit", sectors)
            }
        }
    }
}

impl Error for WorldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorldError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WorldError {
    fn from(err: std::io::Error) -> Self {
        // The NBT reader reports malformed input as InvalidData / UnexpectedEof.
        match err.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                WorldError::FormatError(err.to_string())
            }
            _ => WorldError::IoError(err),
        }
    }
}

impl From<serde_json::Error> for WorldError {
    fn from(err: serde_json::Error) -> Self {
        WorldError::ConfigError(err.to_string())
    }
}
