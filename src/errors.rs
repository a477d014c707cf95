use thiserror::Error;

use crate::decimal::Money;
use crate::types::{BorrowerId, LoanProductId, TransactionId};

/// broad classification used by callers to map errors onto responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// malformed or missing input, rejected before any store access
    Validation,
    /// referenced record does not exist
    NotFound,
    /// user-correctable business rule rejection
    PolicyViolation,
    /// missing or malformed settings, fix configuration rather than retry
    Configuration,
    /// unit of work or read/write failure against the store
    Store,
    /// caller cancelled the call or its deadline passed
    Cancelled,
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("user already registered")]
    BorrowerAlreadyRegistered {
        email: String,
    },

    #[error("setting not found: {name}")]
    SettingNotFound {
        name: String,
    },

    #[error("setting eod date invalid: {value}")]
    InvalidEodDate {
        value: String,
    },

    #[error("setting limit billing for delinquent invalid: {value}")]
    InvalidDelinquencyLimit {
        value: String,
    },

    #[error("user not registered")]
    BorrowerNotRegistered {
        id: BorrowerId,
    },

    #[error("loan not found")]
    LoanProductNotFound {
        id: LoanProductId,
    },

    #[error("loan transaction not found")]
    TransactionNotFound {
        id: TransactionId,
    },

    #[error("loan billing not found")]
    BillingNotFound {
        transaction_id: TransactionId,
    },

    #[error("this user is delinquent and cannot process loan transaction!")]
    BorrowerDelinquent {
        id: BorrowerId,
        level: u32,
    },

    #[error("please complete your previous loan transaction billing before creating a new one")]
    TransactionLimit {
        borrower_id: BorrowerId,
    },

    #[error("loan repayment type not available!")]
    RepaymentUnitNotAvailable {
        unit: String,
    },

    #[error("invalid loan repayment type!")]
    RepaymentUnitInvalid {
        unit: String,
    },

    #[error("the amount paid does not match, amount can't be less than or greater than the outstanding amount")]
    AmountNotMatch {
        amount: Money,
        remaining: Money,
    },

    #[error("store failure: {message}")]
    Store {
        message: String,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("call cancelled")]
    Cancelled,

    #[error("call deadline exceeded")]
    DeadlineExceeded,
}

impl BillingError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        BillingError::Store {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::Validation { .. } | BillingError::BorrowerAlreadyRegistered { .. } => {
                ErrorKind::Validation
            }
            BillingError::BorrowerNotRegistered { .. }
            | BillingError::LoanProductNotFound { .. }
            | BillingError::TransactionNotFound { .. }
            | BillingError::BillingNotFound { .. } => ErrorKind::NotFound,
            BillingError::BorrowerDelinquent { .. }
            | BillingError::TransactionLimit { .. }
            | BillingError::RepaymentUnitNotAvailable { .. }
            | BillingError::RepaymentUnitInvalid { .. }
            | BillingError::AmountNotMatch { .. } => ErrorKind::PolicyViolation,
            BillingError::SettingNotFound { .. }
            | BillingError::InvalidEodDate { .. }
            | BillingError::InvalidDelinquencyLimit { .. } => ErrorKind::Configuration,
            BillingError::Store { .. } | BillingError::Sqlite(_) | BillingError::Json(_) => {
                ErrorKind::Store
            }
            BillingError::Cancelled | BillingError::DeadlineExceeded => ErrorKind::Cancelled,
        }
    }

    /// whether the caller can fix the request and try again
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::PolicyViolation
        )
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
