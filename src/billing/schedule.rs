use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};
use crate::model::NewInstallment;
use crate::types::{BorrowerId, RepaymentUnit, TransactionId};

/// one row of a generated schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    /// 1-based position in the schedule
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub principal_due: Money,
    pub interest_due: Money,
}

impl ScheduledInstallment {
    pub fn total_due(&self) -> Money {
        self.principal_due + self.interest_due
    }
}

/// billing schedule for one loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSchedule {
    pub principal: Money,
    pub interest_rate: Rate,
    pub repayment_unit: RepaymentUnit,
    pub start_date: NaiveDate,
    pub installments: Vec<ScheduledInstallment>,
    pub total_interest: Money,
}

impl BillingSchedule {
    pub fn len(&self) -> usize {
        self.installments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    pub fn total_principal(&self) -> Money {
        self.installments.iter().map(|i| i.principal_due).sum()
    }

    pub fn total_due(&self) -> Money {
        self.total_principal() + self.total_interest
    }

    /// rows ready to be stored against a transaction
    pub fn to_new_installments(
        &self,
        transaction_id: TransactionId,
        borrower_id: BorrowerId,
    ) -> Vec<NewInstallment> {
        self.installments
            .iter()
            .map(|i| NewInstallment {
                transaction_id,
                borrower_id,
                due_date: i.due_date,
                principal_due: i.principal_due,
                interest_due: i.interest_due,
            })
            .collect()
    }
}

/// schedule generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleGenerator {
    minor_unit_dp: u32,
}

impl ScheduleGenerator {
    /// `minor_unit_dp` is the smallest currency step the principal is split at
    pub fn new(minor_unit_dp: u32) -> Self {
        Self { minor_unit_dp }
    }

    pub fn minor_unit_dp(&self) -> u32 {
        self.minor_unit_dp
    }

    /// generate the schedule for `count` periods starting after `start`
    pub fn generate(
        &self,
        principal: Money,
        unit: &RepaymentUnit,
        count: u32,
        rate: Rate,
        start: NaiveDate,
    ) -> Result<BillingSchedule> {
        let period_days = match unit {
            RepaymentUnit::Week => 7,
            RepaymentUnit::Month | RepaymentUnit::Year => {
                return Err(BillingError::RepaymentUnitNotAvailable {
                    unit: unit.to_string(),
                })
            }
            RepaymentUnit::Other(_) => {
                return Err(BillingError::RepaymentUnitInvalid {
                    unit: unit.to_string(),
                })
            }
        };

        if count < 1 {
            return Err(BillingError::validation("repayment_duration", "must be at least 1"));
        }
        if !principal.is_positive() {
            return Err(BillingError::validation("amount", "must be greater than zero"));
        }
        if rate.is_negative() {
            return Err(BillingError::validation("interest_rate", "must not be negative"));
        }

        let shares = principal.split_even(count, self.minor_unit_dp).ok_or_else(|| {
            BillingError::validation(
                "amount",
                format!("{} is finer than {} decimal places", principal, self.minor_unit_dp),
            )
        })?;

        let too_large = || {
            BillingError::validation(
                "amount",
                format!("{} at {} is too large to bill", principal, rate),
            )
        };

        let mut installments = Vec::with_capacity(shares.len());
        for (principal_due, k) in shares.into_iter().zip(1..=count) {
            let interest_due = principal_due
                .checked_percentage(rate.as_percentage())
                .ok_or_else(too_large)?;
            installments.push(ScheduledInstallment {
                sequence: k,
                due_date: start + Duration::days(period_days * i64::from(k)),
                principal_due,
                interest_due,
            });
        }

        // every later sum over these rows stays below the grand total
        let total_interest = installments
            .iter()
            .try_fold(Money::ZERO, |acc, i| acc.checked_add(i.interest_due))
            .ok_or_else(too_large)?;
        principal.checked_add(total_interest).ok_or_else(too_large)?;

        Ok(BillingSchedule {
            principal,
            interest_rate: rate,
            repayment_unit: unit.clone(),
            start_date: start,
            installments,
            total_interest,
        })
    }
}

impl Default for ScheduleGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}
