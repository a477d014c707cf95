//! Persistence seams.
//!
//! Each aggregate gets its own repository trait. A [`UnitOfWork`] bundles
//! all of them over one atomic scope: nothing written through it is visible
//! to other units until [`UnitOfWork::commit`], and dropping it uncommitted
//! rolls every write back. Lookups return `Ok(None)` for a missing record so
//! "not found" stays distinct from a store failure.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::model::{
    AuditInfo, Borrower, DelinquencyHistory, Installment, InstallmentFilter, LoanProduct,
    LoanTransaction, NewBorrower, NewInstallment, NewLoanProduct, NewPayment, NewTransaction,
    Payment, Setting,
};
use crate::types::{BorrowerId, LoanProductId, TransactionId};

pub use memory::{Fault, InsertKind, MemoryStore, Tripwire};
pub use sqlite::SqliteStore;

pub trait SettingRepository {
    fn get_setting(&mut self, name: &str) -> Result<Option<Setting>>;

    /// insert or overwrite the value of a named setting
    fn put_setting(&mut self, name: &str, value: &str, audit: AuditInfo) -> Result<Setting>;
}

pub trait BorrowerRepository {
    /// fails with `BorrowerAlreadyRegistered` when the email is taken
    fn insert_borrower(&mut self, borrower: NewBorrower, audit: AuditInfo) -> Result<Borrower>;

    fn get_borrower(&mut self, id: BorrowerId) -> Result<Option<Borrower>>;

    fn find_borrower_by_email(&mut self, email: &str) -> Result<Option<Borrower>>;

    fn list_borrowers(&mut self, ids: &[BorrowerId]) -> Result<Vec<Borrower>>;

    fn update_delinquency_level(
        &mut self,
        id: BorrowerId,
        level: u32,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()>;
}

pub trait LoanProductRepository {
    fn insert_product(&mut self, product: NewLoanProduct, audit: AuditInfo) -> Result<LoanProduct>;

    fn get_product(&mut self, id: LoanProductId) -> Result<Option<LoanProduct>>;
}

pub trait TransactionRepository {
    /// fails with `TransactionLimit` when the borrower already has an unpaid transaction
    fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
        audit: AuditInfo,
    ) -> Result<LoanTransaction>;

    fn set_invoice_number(
        &mut self,
        id: TransactionId,
        invoice_number: &str,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()>;

    fn mark_transaction_paid(
        &mut self,
        id: TransactionId,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()>;

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<LoanTransaction>>;

    fn find_open_transaction(&mut self, borrower_id: BorrowerId) -> Result<Option<LoanTransaction>>;

    /// every transaction, or only the borrower's, newest first
    fn list_transactions(&mut self, borrower_id: Option<BorrowerId>) -> Result<Vec<LoanTransaction>>;
}

pub trait InstallmentRepository {
    fn insert_installment(&mut self, installment: NewInstallment, audit: AuditInfo)
        -> Result<Installment>;

    /// matching installments ordered by due date, then id
    fn list_installments(&mut self, filter: &InstallmentFilter) -> Result<Vec<Installment>>;

    /// persist the paid legs, the checked flag and the update stamp
    fn update_installment(&mut self, installment: &Installment) -> Result<()>;
}

pub trait PaymentRepository {
    fn insert_payment(&mut self, payment: NewPayment, audit: AuditInfo) -> Result<Payment>;

    fn list_payments(&mut self, transaction_ids: &[TransactionId]) -> Result<Vec<Payment>>;
}

pub trait DelinquencyHistoryRepository {
    fn insert_delinquency_history(
        &mut self,
        transaction_id: TransactionId,
        bills: serde_json::Value,
        audit: AuditInfo,
    ) -> Result<DelinquencyHistory>;

    fn list_delinquency_history(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<Vec<DelinquencyHistory>>;
}

/// atomic scope over every repository
pub trait UnitOfWork:
    SettingRepository
    + BorrowerRepository
    + LoanProductRepository
    + TransactionRepository
    + InstallmentRepository
    + PaymentRepository
    + DelinquencyHistoryRepository
{
    fn commit(self: Box<Self>) -> Result<()>;

    /// explicit rollback; dropping the unit has the same effect
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// persistent state shared by every call
pub trait Store: Send + Sync {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>>;

    /// unit for calls that never write, stores may lock less for it
    fn begin_read(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        self.begin()
    }
}
