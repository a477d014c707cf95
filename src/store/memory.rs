use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::context::CancelFlag;
use crate::errors::{BillingError, Result};
use crate::model::{
    AuditInfo, Audited, Borrower, DelinquencyHistory, Installment, InstallmentFilter, LoanProduct,
    LoanTransaction, NewBorrower, NewInstallment, NewLoanProduct, NewPayment, NewTransaction,
    Payment, Setting,
};
use crate::types::{BorrowerId, LoanProductId, TransactionId, TransactionStatus};

use super::{
    BorrowerRepository, DelinquencyHistoryRepository, InstallmentRepository,
    LoanProductRepository, PaymentRepository, SettingRepository, Store, TransactionRepository,
    UnitOfWork,
};

/// one-shot failure injected into the next unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// fail once `after` installments were inserted in the unit
    InstallmentInsert { after: usize },
    /// fail once `after` payments were inserted in the unit
    PaymentInsert { after: usize },
    BorrowerUpdate,
    Commit,
}

/// rows counted by a [`Tripwire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertKind {
    Installment,
    Payment,
}

/// cancels `flag` once `after` rows of `kind` were inserted in the next unit
#[derive(Debug, Clone)]
pub struct Tripwire {
    pub kind: InsertKind,
    pub after: usize,
    pub flag: CancelFlag,
}

#[derive(Debug, Clone, Default)]
struct Sequences {
    setting: i64,
    borrower: i64,
    product: i64,
    transaction: i64,
    installment: i64,
    payment: i64,
    history: i64,
}

impl Sequences {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    seq: Sequences,
    settings: BTreeMap<i64, Setting>,
    borrowers: BTreeMap<BorrowerId, Borrower>,
    products: BTreeMap<LoanProductId, LoanProduct>,
    transactions: BTreeMap<TransactionId, LoanTransaction>,
    installments: BTreeMap<i64, Installment>,
    payments: BTreeMap<i64, Payment>,
    histories: BTreeMap<i64, DelinquencyHistory>,
}

/// in-process store for tests and demos
///
/// A unit of work holds the store lock for its whole lifetime and works on
/// a private copy of the state, which replaces the shared state on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fault: Mutex<Option<Fault>>,
    tripwire: Mutex<Option<Tripwire>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// make the next unit of work fail at the given point
    pub fn inject_fault(&self, fault: Fault) {
        if let Ok(mut slot) = self.fault.lock() {
            *slot = Some(fault);
        }
    }

    /// cancel a call from inside its next unit of work
    pub fn arm_tripwire(&self, tripwire: Tripwire) {
        if let Ok(mut slot) = self.tripwire.lock() {
            *slot = Some(tripwire);
        }
    }
}

impl Store for MemoryStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        let guard = self
            .state
            .lock()
            .map_err(|_| BillingError::store("memory store lock poisoned"))?;
        let fault = self
            .fault
            .lock()
            .map_err(|_| BillingError::store("memory store lock poisoned"))?
            .take();
        let tripwire = self
            .tripwire
            .lock()
            .map_err(|_| BillingError::store("memory store lock poisoned"))?
            .take();
        let working = (*guard).clone();

        Ok(Box::new(MemoryUnit {
            guard,
            working,
            fault,
            tripwire,
            installment_inserts: 0,
            payment_inserts: 0,
        }))
    }
}

struct MemoryUnit<'a> {
    guard: MutexGuard<'a, MemoryState>,
    working: MemoryState,
    fault: Option<Fault>,
    tripwire: Option<Tripwire>,
    installment_inserts: usize,
    payment_inserts: usize,
}

impl MemoryUnit<'_> {
    fn injected(what: &str) -> BillingError {
        BillingError::store(format!("injected fault: {}", what))
    }

    fn trip(&self, kind: InsertKind, inserted: usize) {
        if let Some(wire) = &self.tripwire {
            if wire.kind == kind && wire.after == inserted {
                wire.flag.cancel();
            }
        }
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        if self.fault == Some(Fault::Commit) {
            return Err(Self::injected("commit"));
        }
        let MemoryUnit {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl SettingRepository for MemoryUnit<'_> {
    fn get_setting(&mut self, name: &str) -> Result<Option<Setting>> {
        Ok(self
            .working
            .settings
            .values()
            .find(|s| s.name == name && !s.is_deleted())
            .cloned())
    }

    fn put_setting(&mut self, name: &str, value: &str, audit: AuditInfo) -> Result<Setting> {
        let existing = self
            .working
            .settings
            .values_mut()
            .find(|s| s.name == name && !s.is_deleted());

        if let Some(setting) = existing {
            setting.value = value.to_string();
            setting.audit.updated_at = Some(audit.created_at);
            setting.audit.updated_by = Some(audit.created_by);
            return Ok(setting.clone());
        }

        let id = Sequences::next(&mut self.working.seq.setting);
        let setting = Setting {
            id,
            name: name.to_string(),
            value: value.to_string(),
            audit,
        };
        self.working.settings.insert(id, setting.clone());
        Ok(setting)
    }
}

impl BorrowerRepository for MemoryUnit<'_> {
    fn insert_borrower(&mut self, borrower: NewBorrower, audit: AuditInfo) -> Result<Borrower> {
        if self.find_borrower_by_email(&borrower.email)?.is_some() {
            return Err(BillingError::BorrowerAlreadyRegistered {
                email: borrower.email,
            });
        }

        let id = Sequences::next(&mut self.working.seq.borrower);
        let record = Borrower {
            id,
            name: borrower.name,
            email: borrower.email,
            password_hash: borrower.password_hash,
            delinquency_level: 0,
            audit,
        };
        self.working.borrowers.insert(id, record.clone());
        Ok(record)
    }

    fn get_borrower(&mut self, id: BorrowerId) -> Result<Option<Borrower>> {
        Ok(self
            .working
            .borrowers
            .get(&id)
            .filter(|b| !b.is_deleted())
            .cloned())
    }

    fn find_borrower_by_email(&mut self, email: &str) -> Result<Option<Borrower>> {
        Ok(self
            .working
            .borrowers
            .values()
            .find(|b| b.email == email && !b.is_deleted())
            .cloned())
    }

    fn list_borrowers(&mut self, ids: &[BorrowerId]) -> Result<Vec<Borrower>> {
        Ok(self
            .working
            .borrowers
            .values()
            .filter(|b| ids.contains(&b.id) && !b.is_deleted())
            .cloned()
            .collect())
    }

    fn update_delinquency_level(
        &mut self,
        id: BorrowerId,
        level: u32,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()> {
        if self.fault == Some(Fault::BorrowerUpdate) {
            return Err(Self::injected("borrower update"));
        }
        let borrower = self
            .working
            .borrowers
            .get_mut(&id)
            .ok_or(BillingError::BorrowerNotRegistered { id })?;
        borrower.delinquency_level = level;
        borrower.audit.updated_at = Some(updated_at);
        borrower.audit.updated_by = Some(updated_by.to_string());
        Ok(())
    }
}

impl LoanProductRepository for MemoryUnit<'_> {
    fn insert_product(&mut self, product: NewLoanProduct, audit: AuditInfo) -> Result<LoanProduct> {
        let id = Sequences::next(&mut self.working.seq.product);
        let interest_rate = product.interest_rate();
        let record = LoanProduct {
            id,
            name: product.name,
            description: product.description,
            interest_rate,
            repayment_unit: product.repayment_unit,
            repayment_count: product.repayment_count,
            audit,
        };
        self.working.products.insert(id, record.clone());
        Ok(record)
    }

    fn get_product(&mut self, id: LoanProductId) -> Result<Option<LoanProduct>> {
        Ok(self
            .working
            .products
            .get(&id)
            .filter(|p| !p.is_deleted())
            .cloned())
    }
}

impl TransactionRepository for MemoryUnit<'_> {
    fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
        audit: AuditInfo,
    ) -> Result<LoanTransaction> {
        if self.find_open_transaction(transaction.borrower_id)?.is_some() {
            return Err(BillingError::TransactionLimit {
                borrower_id: transaction.borrower_id,
            });
        }

        let id = Sequences::next(&mut self.working.seq.transaction);
        let record = transaction.into_transaction(id, audit);
        self.working.transactions.insert(id, record.clone());
        Ok(record)
    }

    fn set_invoice_number(
        &mut self,
        id: TransactionId,
        invoice_number: &str,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()> {
        let tx = self
            .working
            .transactions
            .get_mut(&id)
            .ok_or(BillingError::TransactionNotFound { id })?;
        tx.invoice_number = invoice_number.to_string();
        tx.audit.updated_at = Some(updated_at);
        tx.audit.updated_by = Some(updated_by.to_string());
        Ok(())
    }

    fn mark_transaction_paid(
        &mut self,
        id: TransactionId,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()> {
        let tx = self
            .working
            .transactions
            .get_mut(&id)
            .ok_or(BillingError::TransactionNotFound { id })?;
        tx.status = TransactionStatus::Paid;
        tx.audit.updated_at = Some(updated_at);
        tx.audit.updated_by = Some(updated_by.to_string());
        Ok(())
    }

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<LoanTransaction>> {
        Ok(self
            .working
            .transactions
            .get(&id)
            .filter(|t| !t.is_deleted())
            .cloned())
    }

    fn find_open_transaction(&mut self, borrower_id: BorrowerId) -> Result<Option<LoanTransaction>> {
        Ok(self
            .working
            .transactions
            .values()
            .find(|t| t.borrower_id == borrower_id && t.is_open() && !t.is_deleted())
            .cloned())
    }

    fn list_transactions(&mut self, borrower_id: Option<BorrowerId>) -> Result<Vec<LoanTransaction>> {
        Ok(self
            .working
            .transactions
            .values()
            .rev()
            .filter(|t| !t.is_deleted())
            .filter(|t| borrower_id.map_or(true, |id| t.borrower_id == id))
            .cloned()
            .collect())
    }
}

impl InstallmentRepository for MemoryUnit<'_> {
    fn insert_installment(
        &mut self,
        installment: NewInstallment,
        audit: AuditInfo,
    ) -> Result<Installment> {
        if let Some(Fault::InstallmentInsert { after }) = self.fault {
            if self.installment_inserts >= after {
                return Err(Self::injected("installment insert"));
            }
        }
        self.installment_inserts += 1;
        self.trip(InsertKind::Installment, self.installment_inserts);

        let id = Sequences::next(&mut self.working.seq.installment);
        let record = installment.into_installment(id, audit);
        self.working.installments.insert(id, record.clone());
        Ok(record)
    }

    fn list_installments(&mut self, filter: &InstallmentFilter) -> Result<Vec<Installment>> {
        let mut found: Vec<Installment> = self
            .working
            .installments
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        found.sort_by_key(|i| (i.due_date, i.id));
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn update_installment(&mut self, installment: &Installment) -> Result<()> {
        let stored = self
            .working
            .installments
            .get_mut(&installment.id)
            .ok_or_else(|| BillingError::store(format!("installment {} missing", installment.id)))?;
        stored.principal_paid = installment.principal_paid;
        stored.interest_paid = installment.interest_paid;
        stored.checked_for_delinquency = installment.checked_for_delinquency;
        stored.audit.updated_at = installment.audit.updated_at;
        stored.audit.updated_by = installment.audit.updated_by.clone();
        Ok(())
    }
}

impl PaymentRepository for MemoryUnit<'_> {
    fn insert_payment(&mut self, payment: NewPayment, audit: AuditInfo) -> Result<Payment> {
        if let Some(Fault::PaymentInsert { after }) = self.fault {
            if self.payment_inserts >= after {
                return Err(Self::injected("payment insert"));
            }
        }
        self.payment_inserts += 1;
        self.trip(InsertKind::Payment, self.payment_inserts);

        let id = Sequences::next(&mut self.working.seq.payment);
        let record = payment.into_payment(id, audit);
        self.working.payments.insert(id, record.clone());
        Ok(record)
    }

    fn list_payments(&mut self, transaction_ids: &[TransactionId]) -> Result<Vec<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .filter(|p| transaction_ids.contains(&p.transaction_id) && !p.is_deleted())
            .cloned()
            .collect())
    }
}

impl DelinquencyHistoryRepository for MemoryUnit<'_> {
    fn insert_delinquency_history(
        &mut self,
        transaction_id: TransactionId,
        bills: serde_json::Value,
        audit: AuditInfo,
    ) -> Result<DelinquencyHistory> {
        let id = Sequences::next(&mut self.working.seq.history);
        let record = DelinquencyHistory {
            id,
            transaction_id,
            bills,
            audit,
        };
        self.working.histories.insert(id, record.clone());
        Ok(record)
    }

    fn list_delinquency_history(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<Vec<DelinquencyHistory>> {
        Ok(self
            .working
            .histories
            .values()
            .filter(|h| h.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}
