use std::io;
use std::path::PathBuf;

use crate::directory::IntegrityIssue;

pub type Result<T> = std::result::Result<T, MediaError>;

/// Why a candidate string is not a valid index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("{0:?} does not have the shape <prefix><date><suffix>")]
    Shape(String),
    #[error("prefix {0:?} is not registered")]
    UnregisteredPrefix(String),
    #[error("date {0:?} is not a valid calendar date")]
    InvalidDate(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("handle is detached from the filesystem")]
    InvalidReference,

    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("no index prefix registered for media type {}", .0.as_deref().unwrap_or("<unset>"))]
    UnknownMediaType(Option<String>),

    #[error("number must be non-negative, got {0}")]
    InvalidNumber(i64),

    #[error("{number} does not fit in {length} digits")]
    OutOfRange { number: i64, length: usize },

    #[error("cannot parse index: {0}")]
    Parse(#[from] ParseFailure),

    #[error("{0} is already indexed")]
    AlreadyIndexed(String),

    #[error("name already taken: {}", .0.display())]
    NameCollision(PathBuf),

    #[error("{} collides with existing file {}", .dest.display(), .existing.display())]
    DestinationCollision { dest: PathBuf, existing: PathBuf },

    #[error("could not index {}: {source}", .path.display())]
    Indexing {
        path: PathBuf,
        #[source]
        source: Box<MediaError>,
    },

    #[error("generated index {candidate:?} is invalid: {source}")]
    IndexGeneration {
        candidate: String,
        #[source]
        source: ParseFailure,
    },

    #[error("could not import {} into {}: {source}", .src.display(), .dst_root.display())]
    Import {
        src: PathBuf,
        dst_root: PathBuf,
        #[source]
        source: Box<MediaError>,
        rollback: Option<Box<MediaError>>,
    },

    #[error("integrity check failed with {} issue(s)", .0.len())]
    IntegrityCheckFailed(Vec<IntegrityIssue>),

    #[error("cannot create directory {}: {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid mode: {0:?}")]
    InvalidMode(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MediaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MediaError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn indexing(path: impl Into<PathBuf>, source: MediaError) -> Self {
        MediaError::Indexing {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// The innermost cause, looking through `Indexing` and `Import` wrappers.
    pub fn root_cause(&self) -> &MediaError {
        match self {
            MediaError::Indexing { source, .. } | MediaError::Import { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}
