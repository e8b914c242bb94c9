//! fontswap 공용 에러 타입 — 작업 종류를 구분하여
//! 워처는 로그만 남기고 계속 돌고, CLI는 적절한 메시지로 종료할 수 있게 합니다.

use std::io;
use std::path::{Path, PathBuf};

/// 엔진/복원/프로세스 작업 중 발생할 수 있는 에러 유형
#[derive(thiserror::Error, Debug)]
pub enum FontSwapError {
    #[error("No source font is ready in '{}' ({reason})", .dir.display())]
    SourceUnavailable { dir: PathBuf, reason: String },

    #[error("File system error during {operation} on '{}': {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Backup folder not found: {}", .0.display())]
    BackupMissing(PathBuf),

    #[error("Backup folder is not empty: {}", .0.display())]
    BackupNotEmpty(PathBuf),

    #[error("Target folder is locked by PID {pid}: {}", .path.display())]
    Locked { path: PathBuf, pid: u32 },

    #[error("Client executable not found: {}", .0.display())]
    ClientExecutableMissing(PathBuf),

    #[error("Failed to launch '{}': {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FontSwapError>;

impl FontSwapError {
    /// IO 에러를 작업 이름/경로와 함께 감싸기
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        FontSwapError::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// 다음 틱에서 다시 시도하면 풀릴 수 있는 에러인지 확인
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SourceUnavailable { .. } => true,
            Self::Locked { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            Self::BackupMissing(_) | Self::BackupNotEmpty(_) => false,
            Self::ClientExecutableMissing(_) | Self::Spawn { .. } => false,
            Self::InvalidConfig(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::Io { .. } => "IO_ERROR",
            Self::BackupMissing(_) => "BACKUP_MISSING",
            Self::BackupNotEmpty(_) => "BACKUP_NOT_EMPTY",
            Self::Locked { .. } => "TARGET_LOCKED",
            Self::ClientExecutableMissing(_) => "CLIENT_EXE_MISSING",
            Self::Spawn { .. } => "SPAWN_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// `io::Result`에 작업 컨텍스트를 붙이는 헬퍼
pub trait IoContext<T> {
    fn with_path(self, operation: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, operation: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| FontSwapError::io(operation, path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_operation_and_path() {
        let err = FontSwapError::io(
            "move",
            "/fonts/a.ttf",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("move"));
        assert!(msg.contains("a.ttf"));
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn recoverable_classification() {
        let locked = FontSwapError::Locked { path: PathBuf::from("x"), pid: 7 };
        assert!(locked.is_recoverable());

        let busy = FontSwapError::io(
            "copy",
            "x",
            io::Error::new(io::ErrorKind::PermissionDenied, "in use"),
        );
        assert!(busy.is_recoverable());

        let missing = FontSwapError::ClientExecutableMissing(PathBuf::from("x.exe"));
        assert!(!missing.is_recoverable());
        assert_eq!(missing.error_code(), "CLIENT_EXE_MISSING");
    }
}
