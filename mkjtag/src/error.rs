use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid size: {0:?}")]
    InvalidSize(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("can't read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} is too large ({size} bytes)", .path.display())]
    FileTooLarge { path: PathBuf, size: u64 },
    #[error("{} ({size} bytes) does not fit in its {range:#x} byte range", .path.display())]
    FileOutOfRange {
        path: PathBuf,
        size: u32,
        range: u32,
    },
    #[error("{} changed while copying: expected {expected} bytes, found {found}", .path.display())]
    FileChanged {
        path: PathBuf,
        expected: u32,
        found: u64,
    },
    #[error("{0}")]
    Usage(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] deku::error::DekuError),
    #[error("Parse toml error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::File {
            path: path.into(),
            source,
        }
    }

    /// Whether the binary should print usage text along with this error.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }

    /// Whether this error was caused by a referenced input file.
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            Error::File { .. }
                | Error::FileTooLarge { .. }
                | Error::FileOutOfRange { .. }
                | Error::FileChanged { .. }
        )
    }
}
