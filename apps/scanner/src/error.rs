//! Top-level error for the scanner binary.

use checkin_db::DbError;
use checkin_sync::CheckInError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    CheckIn(#[from] CheckInError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine app data directory")]
    NoDataDir,
}

impl AppError {
    /// Process exit code: 2 for configuration problems, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::CheckIn(e) if e.is_config_error() => 2,
            AppError::NoDataDir => 2,
            _ => 1,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config = AppError::from(CheckInError::InvalidConfig("bad".into()));
        assert_eq!(config.exit_code(), 2);

        let db = AppError::from(DbError::ConnectionFailed("gone".into()));
        assert_eq!(db.exit_code(), 1);
    }
}
