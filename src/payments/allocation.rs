use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::model::Installment;
use crate::types::{InstallmentId, TransactionId};

/// whole-installment settlement planned for one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub installment_id: InstallmentId,
    pub transaction_id: TransactionId,
    pub due_date: NaiveDate,
    pub principal: Money,
    pub interest: Money,
}

impl AllocationLine {
    pub fn total(&self) -> Money {
        self.principal + self.interest
    }
}

/// result of allocating a payment over payable installments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub amount: Money,
    pub lines: Vec<AllocationLine>,
}

impl Allocation {
    pub fn to_principal(&self) -> Money {
        self.lines.iter().map(|l| l.principal).sum()
    }

    pub fn to_interest(&self) -> Money {
        self.lines.iter().map(|l| l.interest).sum()
    }

    pub fn applied(&self) -> Money {
        self.to_principal() + self.to_interest()
    }

    pub fn settles(&self, installment_id: InstallmentId) -> bool {
        self.lines.iter().any(|l| l.installment_id == installment_id)
    }
}

/// oldest-first allocator. payments settle whole installments only
pub struct PaymentAllocator;

impl PaymentAllocator {
    /// Plan how `amount` settles `payable`.
    ///
    /// Installments are consumed in due-date order while any amount remains.
    /// The amount has to land exactly on an installment boundary: a positive
    /// or negative remainder fails with `AmountNotMatch`.
    pub fn allocate(payable: &[Installment], amount: Money) -> Result<Allocation> {
        if !amount.is_positive() {
            return Err(BillingError::validation("amount", "must be greater than zero"));
        }

        let mut ordered: Vec<&Installment> = payable.iter().collect();
        ordered.sort_by_key(|i| (i.due_date, i.id));

        let mut remaining = amount;
        let mut lines = Vec::new();

        for inst in ordered {
            if !remaining.is_positive() {
                break;
            }
            let line = AllocationLine {
                installment_id: inst.id,
                transaction_id: inst.transaction_id,
                due_date: inst.due_date,
                principal: inst.outstanding_principal(),
                interest: inst.outstanding_interest(),
            };
            remaining -= line.total();
            lines.push(line);
        }

        if !remaining.is_zero() {
            return Err(BillingError::AmountNotMatch { amount, remaining });
        }

        Ok(Allocation { amount, lines })
    }
}
