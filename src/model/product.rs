use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{BillingError, Result};
use crate::types::{LoanProductId, RepaymentUnit};

use super::audit::{impl_audited, AuditInfo};

/// loan product terms, snapshotted onto every transaction that uses them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanProduct {
    pub id: LoanProductId,
    pub name: String,
    pub description: String,
    /// simple interest charged on each installment's principal share
    pub interest_rate: Rate,
    pub repayment_unit: RepaymentUnit,
    pub repayment_count: u32,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl_audited!(LoanProduct);

impl LoanProduct {
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLoanProduct {
    pub name: String,
    pub description: String,
    /// percent per repayment period (10 for 10%)
    pub interest_rate_percent: Decimal,
    pub repayment_unit: RepaymentUnit,
    pub repayment_count: u32,
}

impl NewLoanProduct {
    /// weekly product
    pub fn weekly(name: impl Into<String>, interest_rate_percent: Decimal, weeks: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            interest_rate_percent,
            repayment_unit: RepaymentUnit::Week,
            repayment_count: weeks,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > 255 {
            return Err(BillingError::validation("name", "must be 1 to 255 characters"));
        }
        if self.interest_rate_percent < Decimal::ZERO {
            return Err(BillingError::validation("interest_rate", "must not be negative"));
        }
        if !self.repayment_unit.is_known() {
            return Err(BillingError::validation(
                "repayment_type",
                format!("{} is not one of weeks, months, years", self.repayment_unit),
            ));
        }
        if self.repayment_count < 1 {
            return Err(BillingError::validation("repayment_duration", "must be at least 1"));
        }
        Ok(())
    }

    pub fn interest_rate(&self) -> Rate {
        Rate::from_percent_decimal(self.interest_rate_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_product_validation() {
        assert!(NewLoanProduct::weekly("Modal Usaha", dec!(10), 50).validate().is_ok());
        assert!(NewLoanProduct::weekly("", dec!(10), 50).validate().is_err());
        assert!(NewLoanProduct::weekly("Modal Usaha", dec!(-1), 50).validate().is_err());
        assert!(NewLoanProduct::weekly("Modal Usaha", dec!(10), 0).validate().is_err());

        let mut monthly = NewLoanProduct::weekly("Bulanan", dec!(2), 12);
        monthly.repayment_unit = RepaymentUnit::Month;
        // reserved units can be stored, they are rejected when scheduling
        assert!(monthly.validate().is_ok());

        monthly.repayment_unit = RepaymentUnit::from("days");
        assert!(monthly.validate().is_err());
    }

    #[test]
    fn test_interest_rate_conversion() {
        let product = NewLoanProduct::weekly("Modal Usaha", dec!(2.5), 10);
        assert_eq!(product.interest_rate().as_percentage(), dec!(2.5));
    }
}
