use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Business-level rejections are their own variants so callers can render
/// precise messages; `Db` is the infrastructure channel and the only variant
/// worth retrying.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("scan failed integrity verification")]
    Integrity,

    #[error("attendance already recorded")]
    Duplicate,

    #[error("attendance session not found")]
    SessionNotFound,

    #[error("attendance session is closed")]
    SessionClosed,

    #[error("attendance session was already closed")]
    AlreadyClosed,

    #[error("operation not permitted for role {0}")]
    Role(db::models::user::Role),

    #[error("requester does not own this session")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Db(#[from] DbErr),
}

impl ServiceError {
    /// Collapses a failed write into `Duplicate` when the database reports a
    /// unique-constraint violation. The losing side of two racing check-ins
    /// lands here rather than creating a second record.
    pub fn from_write(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Duplicate,
            _ => ServiceError::Db(err),
        }
    }

    /// True for rejections the caller should surface to the user as-is.
    pub fn is_business(&self) -> bool {
        !matches!(self, ServiceError::Db(_))
    }
}
