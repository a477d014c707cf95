use serde::{Deserialize, Serialize};

use crate::errors::{BillingError, Result};
use crate::types::BorrowerId;

use super::audit::{impl_audited, AuditInfo};

/// registered borrower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub id: BorrowerId,
    pub name: String,
    pub email: String,
    /// never leaves the store: skipped when the borrower is snapshotted or viewed
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// 0 = good standing, only the delinquency scan raises it
    pub delinquency_level: u32,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl_audited!(Borrower);

impl Borrower {
    pub fn is_delinquent(&self) -> bool {
        self.delinquency_level > 0
    }

    /// JSON copy stored on a loan transaction
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// borrower registration input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBorrower {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl NewBorrower {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > 255 {
            return Err(BillingError::validation("name", "must be 1 to 255 characters"));
        }
        let email = self.email.trim();
        if email.len() > 255 || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(BillingError::validation("email", "must be a valid email address"));
        }
        if self.password_hash.is_empty() {
            return Err(BillingError::validation("password_hash", "is required"));
        }
        Ok(())
    }
}
