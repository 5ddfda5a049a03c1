use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

/// Everything that can go wrong while reading or mutating the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found")]
    NotFound,

    #[error("account already exists")]
    AlreadyExists,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid points: {0}")]
    InvalidPoints(String),

    #[error("insufficient balance: available {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl LedgerError {
    pub fn storage(e: impl Into<anyhow::Error>) -> Self {
        LedgerError::Storage(e.into())
    }

    /// Validation failures are answered with a re-prompt, never escalated.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount(_) | LedgerError::InvalidPoints(_) | LedgerError::InsufficientBalance { .. }
        )
    }
}

impl From<DieselError> for LedgerError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => LedgerError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => LedgerError::AlreadyExists,
            e => LedgerError::Storage(e.into()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for LedgerError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        LedgerError::Storage(e.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        assert!(matches!(LedgerError::from(DieselError::NotFound), LedgerError::NotFound));
    }

    #[test]
    fn diesel_rollback_is_a_storage_failure() {
        assert!(matches!(
            LedgerError::from(DieselError::RollbackTransaction),
            LedgerError::Storage(_)
        ));
    }

    #[test]
    fn user_input_errors_are_recognised() {
        assert!(LedgerError::InvalidAmount("x".into()).is_user_input());
        assert!(LedgerError::InsufficientBalance { balance: 1, requested: 2 }.is_user_input());
        assert!(!LedgerError::NotFound.is_user_input());
        assert!(!LedgerError::storage(anyhow::anyhow!("down")).is_user_input());
    }
}
