use serde::{Deserialize, Serialize};
use std::fmt;

/// store-assigned identifiers
pub type BorrowerId = i64;
pub type LoanProductId = i64;
pub type TransactionId = i64;
pub type InstallmentId = i64;
pub type PaymentId = i64;
pub type SettingId = i64;

/// repayment period unit of a loan product
///
/// Values that do not name a known unit are kept as `Other` so a product
/// row written elsewhere can still be loaded and rejected at scheduling time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RepaymentUnit {
    Week,
    /// reserved, not available for scheduling
    Month,
    /// reserved, not available for scheduling
    Year,
    Other(String),
}

impl RepaymentUnit {
    pub fn as_str(&self) -> &str {
        match self {
            RepaymentUnit::Week => "weeks",
            RepaymentUnit::Month => "months",
            RepaymentUnit::Year => "years",
            RepaymentUnit::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RepaymentUnit::Other(_))
    }
}

impl From<String> for RepaymentUnit {
    fn from(s: String) -> Self {
        RepaymentUnit::from(s.as_str())
    }
}

impl From<&str> for RepaymentUnit {
    fn from(s: &str) -> Self {
        match s {
            "weeks" => RepaymentUnit::Week,
            "months" => RepaymentUnit::Month,
            "years" => RepaymentUnit::Year,
            other => RepaymentUnit::Other(other.to_string()),
        }
    }
}

impl From<RepaymentUnit> for String {
    fn from(unit: RepaymentUnit) -> Self {
        unit.as_str().to_string()
    }
}

impl fmt::Display for RepaymentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// loan transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// at least one installment still open
    Unpaid,
    /// every installment settled
    Paid,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Unpaid => "unpaid",
            TransactionStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(TransactionStatus::Unpaid),
            "paid" => Some(TransactionStatus::Paid),
            _ => None,
        }
    }
}
