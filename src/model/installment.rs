use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::decimal::Money;
use crate::types::{BorrowerId, InstallmentId, TransactionId};

use super::audit::{impl_audited, AuditInfo, Audited};

/// one scheduled billing obligation of a loan transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub transaction_id: TransactionId,
    pub borrower_id: BorrowerId,
    pub due_date: NaiveDate,
    pub principal_due: Money,
    pub principal_paid: Money,
    pub interest_due: Money,
    pub interest_paid: Money,
    pub checked_for_delinquency: bool,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl_audited!(Installment);

impl Installment {
    pub fn total_due(&self) -> Money {
        self.principal_due + self.interest_due
    }

    pub fn total_paid(&self) -> Money {
        self.principal_paid + self.interest_paid
    }

    pub fn outstanding_principal(&self) -> Money {
        self.principal_due - self.principal_paid
    }

    pub fn outstanding_interest(&self) -> Money {
        self.interest_due - self.interest_paid
    }

    /// both legs paid in full
    pub fn is_settled(&self) -> bool {
        self.principal_paid >= self.principal_due && self.interest_paid >= self.interest_due
    }

    /// nothing paid on either leg yet
    pub fn is_untouched(&self) -> bool {
        self.principal_paid.is_zero() && self.interest_paid.is_zero()
    }

    pub fn is_due_on_or_before(&self, date: NaiveDate) -> bool {
        self.due_date <= date
    }

    /// pay both legs in full, returning the (principal, interest) applied
    pub fn settle(&mut self, ctx: &CallContext<'_>) -> (Money, Money) {
        let applied = (self.outstanding_principal(), self.outstanding_interest());
        self.principal_paid = self.principal_due;
        self.interest_paid = self.interest_due;
        self.audit.touch(ctx);
        applied
    }

    pub fn mark_checked(&mut self, ctx: &CallContext<'_>) {
        self.checked_for_delinquency = true;
        self.audit.touch(ctx);
    }
}

/// installment produced by the schedule generator, not yet stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstallment {
    pub transaction_id: TransactionId,
    pub borrower_id: BorrowerId,
    pub due_date: NaiveDate,
    pub principal_due: Money,
    pub interest_due: Money,
}

impl NewInstallment {
    pub fn into_installment(self, id: InstallmentId, audit: AuditInfo) -> Installment {
        Installment {
            id,
            transaction_id: self.transaction_id,
            borrower_id: self.borrower_id,
            due_date: self.due_date,
            principal_due: self.principal_due,
            principal_paid: Money::ZERO,
            interest_due: self.interest_due,
            interest_paid: Money::ZERO,
            checked_for_delinquency: false,
            audit,
        }
    }
}

/// selection of installments, results always ordered by due date then id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallmentFilter {
    pub transaction_id: Option<TransactionId>,
    pub borrower_id: Option<BorrowerId>,
    pub due_on_or_before: Option<NaiveDate>,
    /// only installments with both paid legs still zero
    pub untouched_only: bool,
    /// only installments not yet counted by the delinquency scan
    pub unchecked_only: bool,
    /// only installments with something left to pay
    pub unsettled_only: bool,
    pub limit: Option<usize>,
}

impl InstallmentFilter {
    pub fn for_transaction(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            ..Self::default()
        }
    }

    /// a borrower's installments that still carry a balance
    pub fn unsettled_for_borrower(borrower_id: BorrowerId) -> Self {
        Self {
            borrower_id: Some(borrower_id),
            unsettled_only: true,
            ..Self::default()
        }
    }

    /// unpaid installments of a transaction payable as of `as_of`
    pub fn payable(transaction_id: TransactionId, borrower_id: BorrowerId, as_of: NaiveDate) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            borrower_id: Some(borrower_id),
            due_on_or_before: Some(as_of),
            untouched_only: true,
            ..Self::default()
        }
    }

    /// overdue installments the delinquency scan has not counted yet
    pub fn overdue_unchecked(as_of: NaiveDate) -> Self {
        Self {
            due_on_or_before: Some(as_of),
            untouched_only: true,
            unchecked_only: true,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// whether an installment passes every criterion except `limit`
    pub fn matches(&self, installment: &Installment) -> bool {
        self.transaction_id.map_or(true, |id| installment.transaction_id == id)
            && self.borrower_id.map_or(true, |id| installment.borrower_id == id)
            && self
                .due_on_or_before
                .map_or(true, |date| installment.is_due_on_or_before(date))
            && (!self.untouched_only || installment.is_untouched())
            && (!self.unchecked_only || !installment.checked_for_delinquency)
            && (!self.unsettled_only || !installment.is_settled())
            && !installment.is_deleted()
    }
}
