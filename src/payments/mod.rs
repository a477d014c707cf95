pub mod allocation;

use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::model::{Installment, LoanTransaction, Payment};
use crate::types::{BorrowerId, TransactionId};

pub use allocation::{Allocation, AllocationLine, PaymentAllocator};

/// payment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayRequest {
    pub transaction_id: TransactionId,
    pub borrower_id: BorrowerId,
    pub amount: Money,
}

impl PayRequest {
    pub fn new(transaction_id: TransactionId, borrower_id: BorrowerId, amount: Money) -> Self {
        Self {
            transaction_id,
            borrower_id,
            amount,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.transaction_id <= 0 {
            return Err(BillingError::validation("transaction_id", "is required"));
        }
        if self.borrower_id <= 0 {
            return Err(BillingError::validation("user_id", "is required"));
        }
        if !self.amount.is_positive() {
            return Err(BillingError::validation("amount", "must be greater than zero"));
        }
        Ok(())
    }
}

/// committed payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// transaction as stored after the payment
    pub transaction: LoanTransaction,
    pub settled: Vec<Installment>,
    pub payments: Vec<Payment>,
    pub amount: Money,
}

impl PaymentReceipt {
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    /// the payment settled the last open installment
    pub fn closed_transaction(&self) -> bool {
        !self.transaction.is_open()
    }
}
