use std::io;
use std::path::PathBuf;
use std::str::Utf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("target document not found: {}", .0.display())]
    TargetMissing(PathBuf),
    #[error("target document is read-only: {}", .0.display())]
    ReadOnlyTarget(PathBuf),
    #[error("note is not valid UTF-8 text: {}", .path.display())]
    MalformedNote {
        path: PathBuf,
        #[source]
        source: Utf8Error,
    },
    #[error("failed to {op} {}: {source}", .path.display())]
    StorageIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("target document is locked by another process: {}", .0.display())]
    Locked(PathBuf),
}

impl IngestError {
    pub fn storage(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StorageIo {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Locked(_) => ErrorCode::E001Locked,
            Self::TargetMissing(_) => ErrorCode::E002TargetMissing,
            Self::ReadOnlyTarget(_) => ErrorCode::E003ReadOnlyTarget,
            Self::MalformedNote { .. } => ErrorCode::E004MalformedNote,
            Self::StorageIo { .. } => ErrorCode::E005StorageIo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001Locked,
    E002TargetMissing,
    E003ReadOnlyTarget,
    E004MalformedNote,
    E005StorageIo,
    E006DaemonLocked,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002TargetMissing => "E002_TARGET_MISSING",
            Self::E003ReadOnlyTarget => "E003_READ_ONLY_TARGET",
            Self::E004MalformedNote => "E004_MALFORMED_NOTE",
            Self::E005StorageIo => "E005_STORAGE_IO",
            Self::E006DaemonLocked => "E006_DAEMON_LOCKED",
        }
    }
}
