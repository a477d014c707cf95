use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    BorrowerId, InstallmentId, LoanProductId, PaymentId, TransactionId, TransactionStatus,
};

use super::audit::{impl_audited, AuditInfo};
use super::installment::Installment;

/// issued loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTransaction {
    pub id: TransactionId,
    /// empty until back-filled in the creating unit of work
    pub invoice_number: String,
    pub notes: String,
    pub borrower_id: BorrowerId,
    pub borrower_snapshot: serde_json::Value,
    pub loan_product_id: LoanProductId,
    pub product_snapshot: serde_json::Value,
    pub amount: Money,
    pub status: TransactionStatus,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl_audited!(LoanTransaction);

impl LoanTransaction {
    pub fn is_open(&self) -> bool {
        self.status == TransactionStatus::Unpaid
    }
}

/// invoice reference, derived from the store-assigned id
pub fn invoice_number(transaction_id: TransactionId, borrower_id: BorrowerId) -> String {
    format!("LOAN/{}/{}", transaction_id, borrower_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub notes: String,
    pub borrower_id: BorrowerId,
    pub borrower_snapshot: serde_json::Value,
    pub loan_product_id: LoanProductId,
    pub product_snapshot: serde_json::Value,
    pub amount: Money,
}

impl NewTransaction {
    pub fn into_transaction(self, id: TransactionId, audit: AuditInfo) -> LoanTransaction {
        LoanTransaction {
            id,
            invoice_number: String::new(),
            notes: self.notes,
            borrower_id: self.borrower_id,
            borrower_snapshot: self.borrower_snapshot,
            loan_product_id: self.loan_product_id,
            product_snapshot: self.product_snapshot,
            amount: self.amount,
            status: TransactionStatus::Unpaid,
            audit,
        }
    }
}

/// ledger entry for one installment settled by a payment call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub transaction_id: TransactionId,
    pub installment_id: InstallmentId,
    pub principal_amount: Money,
    pub interest_amount: Money,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl_audited!(Payment);

impl Payment {
    pub fn total(&self) -> Money {
        self.principal_amount + self.interest_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub transaction_id: TransactionId,
    pub installment_id: InstallmentId,
    pub principal_amount: Money,
    pub interest_amount: Money,
}

impl NewPayment {
    pub fn into_payment(self, id: PaymentId, audit: AuditInfo) -> Payment {
        Payment {
            id,
            transaction_id: self.transaction_id,
            installment_id: self.installment_id,
            principal_amount: self.principal_amount,
            interest_amount: self.interest_amount,
            audit,
        }
    }
}

/// installments that pushed a borrower to a higher delinquency level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelinquencyHistory {
    pub id: i64,
    pub transaction_id: TransactionId,
    pub bills: serde_json::Value,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl_audited!(DelinquencyHistory);

impl DelinquencyHistory {
    pub fn bills_from(installments: &[&Installment]) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(installments)
    }
}

/// transaction together with its payment ledger, newest payment first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionWithPayments {
    #[serde(flatten)]
    pub transaction: LoanTransaction,
    pub payments: Vec<Payment>,
}
