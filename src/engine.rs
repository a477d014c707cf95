//! Loan billing operations over a [`Store`].
//!
//! Every public call opens exactly one unit of work. Business dates come from
//! the `eod_date` setting, read once inside that unit; audit stamps come from
//! the call context's clock.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::billing::{Outstanding, OutstandingCalculator, ScheduleGenerator};
use crate::config::{
    parse_delinquency_limit, parse_eod_date, EngineConfig, DELINQUENCY_LIMIT_SETTING,
    EOD_DATE_SETTING,
};
use crate::context::CallContext;
use crate::decimal::Money;
use crate::delinquency::{DelinquencyScanner, LevelChange, ScanReport};
use crate::errors::{BillingError, Result};
use crate::model::{
    invoice_number, AuditInfo, Borrower, DelinquencyHistory, Installment, InstallmentFilter,
    LoanProduct, LoanTransaction, NewBorrower, NewLoanProduct, NewPayment, NewTransaction,
    Payment, Setting, TransactionWithPayments,
};
use crate::payments::{PayRequest, PaymentAllocator, PaymentReceipt};
use crate::store::{
    BorrowerRepository, DelinquencyHistoryRepository, InstallmentRepository,
    LoanProductRepository, PaymentRepository, SettingRepository, Store, TransactionRepository,
    UnitOfWork,
};
use crate::types::{BorrowerId, LoanProductId, TransactionId};

/// loan issuance request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub borrower_id: BorrowerId,
    pub loan_product_id: LoanProductId,
    pub amount: Money,
    #[serde(default)]
    pub notes: String,
}

impl CreateTransactionRequest {
    pub fn new(borrower_id: BorrowerId, loan_product_id: LoanProductId, amount: Money) -> Self {
        Self {
            borrower_id,
            loan_product_id,
            amount,
            notes: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.borrower_id <= 0 {
            return Err(BillingError::validation("user_id", "is required"));
        }
        if self.loan_product_id <= 0 {
            return Err(BillingError::validation("loan_id", "is required"));
        }
        if !self.amount.is_positive() {
            return Err(BillingError::validation("amount", "must be greater than zero"));
        }
        Ok(())
    }
}

/// committed loan with its billing schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTransaction {
    pub transaction: LoanTransaction,
    pub installments: Vec<Installment>,
}

/// billing engine
pub struct BillingEngine<S: Store> {
    store: Arc<S>,
    config: EngineConfig,
    generator: ScheduleGenerator,
}

impl<S: Store> BillingEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        Self::with_shared_store(Arc::new(store), config)
    }

    pub fn with_shared_store(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let generator = ScheduleGenerator::new(config.minor_unit_dp);
        Ok(Self {
            store,
            config,
            generator,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn eod_date(unit: &mut dyn UnitOfWork) -> Result<NaiveDate> {
        let setting = unit
            .get_setting(EOD_DATE_SETTING)?
            .ok_or_else(|| BillingError::SettingNotFound {
                name: EOD_DATE_SETTING.to_string(),
            })?;
        parse_eod_date(&setting.value)
    }

    fn delinquency_limit(unit: &mut dyn UnitOfWork) -> Result<usize> {
        let setting = unit
            .get_setting(DELINQUENCY_LIMIT_SETTING)?
            .ok_or_else(|| BillingError::SettingNotFound {
                name: DELINQUENCY_LIMIT_SETTING.to_string(),
            })?;
        parse_delinquency_limit(&setting.value)
    }

    // reference data

    pub fn register_borrower(&self, ctx: &CallContext<'_>, borrower: NewBorrower) -> Result<Borrower> {
        borrower.validate()?;
        ctx.checkpoint()?;

        let mut unit = self.store.begin()?;
        if unit.find_borrower_by_email(&borrower.email)?.is_some() {
            log::warn!("[{}] registration rejected, {} already registered", ctx.request_id, borrower.email);
            return Err(BillingError::BorrowerAlreadyRegistered {
                email: borrower.email,
            });
        }
        let created = unit.insert_borrower(borrower, AuditInfo::created(ctx))?;
        ctx.checkpoint()?;
        unit.commit()?;

        log::info!("[{}] borrower {} registered", ctx.request_id, created.id);
        Ok(created)
    }

    pub fn get_borrower(&self, ctx: &CallContext<'_>, id: BorrowerId) -> Result<Borrower> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin_read()?;
        unit.get_borrower(id)?
            .ok_or(BillingError::BorrowerNotRegistered { id })
    }

    pub fn create_loan_product(
        &self,
        ctx: &CallContext<'_>,
        product: NewLoanProduct,
    ) -> Result<LoanProduct> {
        product.validate()?;
        ctx.checkpoint()?;

        let mut unit = self.store.begin()?;
        let created = unit.insert_product(product, AuditInfo::created(ctx))?;
        ctx.checkpoint()?;
        unit.commit()?;

        log::info!(
            "[{}] loan product {} created: {} x {} at {}",
            ctx.request_id,
            created.id,
            created.repayment_count,
            created.repayment_unit,
            created.interest_rate
        );
        Ok(created)
    }

    /// Insert or overwrite a setting.
    ///
    /// Values of the settings the engine reads are parsed before they are
    /// stored, so a bad value is rejected here and not at the next call.
    pub fn put_setting(&self, ctx: &CallContext<'_>, name: &str, value: &str) -> Result<Setting> {
        match name {
            EOD_DATE_SETTING => {
                parse_eod_date(value)?;
            }
            DELINQUENCY_LIMIT_SETTING => {
                parse_delinquency_limit(value)?;
            }
            _ => {}
        }
        if name.trim().is_empty() {
            return Err(BillingError::validation("name", "is required"));
        }
        ctx.checkpoint()?;

        let mut unit = self.store.begin()?;
        let setting = unit.put_setting(name, value.trim(), AuditInfo::created(ctx))?;
        ctx.checkpoint()?;
        unit.commit()?;

        log::info!("[{}] setting {} = {}", ctx.request_id, name, setting.value);
        Ok(setting)
    }

    // loan transactions

    /// Issue a loan and persist its billing schedule.
    ///
    /// Validation, reference lookups, the one-open-loan check, the
    /// transaction insert, the invoice back-fill and every installment insert
    /// share one unit of work. Any failure drops the unit and nothing is kept.
    pub fn create_transaction(
        &self,
        ctx: &CallContext<'_>,
        request: CreateTransactionRequest,
    ) -> Result<CreatedTransaction> {
        // requested -> validated
        request.validate()?;
        ctx.checkpoint()?;

        let mut unit = self.store.begin()?;
        let start = Self::eod_date(&mut *unit)?;

        let borrower = unit
            .get_borrower(request.borrower_id)?
            .ok_or(BillingError::BorrowerNotRegistered {
                id: request.borrower_id,
            })?;
        if borrower.is_delinquent() {
            log::warn!(
                "[{}] borrower {} is delinquent at level {}, loan refused",
                ctx.request_id,
                borrower.id,
                borrower.delinquency_level
            );
            return Err(BillingError::BorrowerDelinquent {
                id: borrower.id,
                level: borrower.delinquency_level,
            });
        }

        let product = unit
            .get_product(request.loan_product_id)?
            .ok_or(BillingError::LoanProductNotFound {
                id: request.loan_product_id,
            })?;

        if let Some(open) = unit.find_open_transaction(borrower.id)? {
            log::warn!(
                "[{}] borrower {} still has open transaction {}",
                ctx.request_id,
                borrower.id,
                open.id
            );
            return Err(BillingError::TransactionLimit {
                borrower_id: borrower.id,
            });
        }
        ctx.checkpoint()?;

        // validated -> persisted
        let mut transaction = unit.insert_transaction(
            NewTransaction {
                notes: request.notes,
                borrower_id: borrower.id,
                borrower_snapshot: borrower.snapshot()?,
                loan_product_id: product.id,
                product_snapshot: product.snapshot()?,
                amount: request.amount,
            },
            AuditInfo::created(ctx),
        )?;
        let invoice = invoice_number(transaction.id, borrower.id);
        unit.set_invoice_number(transaction.id, &invoice, ctx.now(), &ctx.actor)?;
        transaction.invoice_number = invoice;
        transaction.audit.touch(ctx);
        log::debug!("[{}] transaction {} persisted", ctx.request_id, transaction.id);
        ctx.checkpoint()?;

        // persisted -> scheduled
        let schedule = self.generator.generate(
            transaction.amount,
            &product.repayment_unit,
            product.repayment_count,
            product.interest_rate,
            start,
        )?;
        let mut installments = Vec::with_capacity(schedule.len());
        for row in schedule.to_new_installments(transaction.id, borrower.id) {
            installments.push(unit.insert_installment(row, AuditInfo::created(ctx))?);
        }
        log::debug!(
            "[{}] {} installments scheduled from {}",
            ctx.request_id,
            installments.len(),
            start
        );

        // scheduled -> committed
        ctx.checkpoint()?;
        unit.commit()?;

        log::info!(
            "[{}] loan {} issued to borrower {}: {} over {} {}",
            ctx.request_id,
            transaction.invoice_number,
            borrower.id,
            transaction.amount,
            installments.len(),
            product.repayment_unit
        );
        Ok(CreatedTransaction {
            transaction,
            installments,
        })
    }

    /// transaction with its payments, newest payment first
    pub fn get_transaction(
        &self,
        ctx: &CallContext<'_>,
        id: TransactionId,
    ) -> Result<TransactionWithPayments> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin_read()?;
        let transaction = unit
            .get_transaction(id)?
            .ok_or(BillingError::TransactionNotFound { id })?;
        let payments = newest_first(unit.list_payments(&[id])?);
        Ok(TransactionWithPayments {
            transaction,
            payments,
        })
    }

    /// transactions newest first, optionally only one borrower's
    pub fn list_transactions(
        &self,
        ctx: &CallContext<'_>,
        borrower_id: Option<BorrowerId>,
        with_payments: bool,
    ) -> Result<Vec<TransactionWithPayments>> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin_read()?;
        let transactions = unit.list_transactions(borrower_id)?;

        let mut payments: HashMap<TransactionId, Vec<Payment>> = HashMap::new();
        if with_payments && !transactions.is_empty() {
            let ids: Vec<TransactionId> = transactions.iter().map(|t| t.id).collect();
            for payment in unit.list_payments(&ids)? {
                payments.entry(payment.transaction_id).or_default().push(payment);
            }
        }

        Ok(transactions
            .into_iter()
            .map(|transaction| {
                let payments = newest_first(payments.remove(&transaction.id).unwrap_or_default());
                TransactionWithPayments {
                    transaction,
                    payments,
                }
            })
            .collect())
    }

    /// installments of a transaction in due-date order
    pub fn installments(
        &self,
        ctx: &CallContext<'_>,
        transaction_id: TransactionId,
    ) -> Result<Vec<Installment>> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin_read()?;
        unit.list_installments(&InstallmentFilter::for_transaction(transaction_id))
    }

    // outstanding

    /// outstanding balances as of the configured `eod_date`
    pub fn calculate_outstanding(
        &self,
        ctx: &CallContext<'_>,
        borrower_id: BorrowerId,
    ) -> Result<Outstanding> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin_read()?;
        let as_of = Self::eod_date(&mut *unit)?;
        self.outstanding_within(&mut *unit, borrower_id, as_of)
    }

    pub fn calculate_outstanding_as_of(
        &self,
        ctx: &CallContext<'_>,
        borrower_id: BorrowerId,
        as_of: NaiveDate,
    ) -> Result<Outstanding> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin_read()?;
        self.outstanding_within(&mut *unit, borrower_id, as_of)
    }

    fn outstanding_within(
        &self,
        unit: &mut dyn UnitOfWork,
        borrower_id: BorrowerId,
        as_of: NaiveDate,
    ) -> Result<Outstanding> {
        if unit.get_borrower(borrower_id)?.is_none() {
            return Err(BillingError::BorrowerNotRegistered { id: borrower_id });
        }
        // settled rows add nothing, and paid-off loans must not fill the page
        let installments = unit.list_installments(
            &InstallmentFilter::unsettled_for_borrower(borrower_id)
                .with_limit(self.config.installment_page_size),
        )?;
        Ok(OutstandingCalculator::calculate(&installments, as_of))
    }

    // payments

    /// pay installments due as of the configured `eod_date`
    pub fn pay(&self, ctx: &CallContext<'_>, request: PayRequest) -> Result<PaymentReceipt> {
        request.validate()?;
        ctx.checkpoint()?;
        let mut unit = self.store.begin()?;
        let as_of = Self::eod_date(&mut *unit)?;
        let receipt = self.pay_within(&mut *unit, ctx, &request, as_of)?;
        ctx.checkpoint()?;
        unit.commit()?;
        Self::log_payment(ctx, &receipt);
        Ok(receipt)
    }

    pub fn pay_as_of(
        &self,
        ctx: &CallContext<'_>,
        request: PayRequest,
        as_of: NaiveDate,
    ) -> Result<PaymentReceipt> {
        request.validate()?;
        ctx.checkpoint()?;
        let mut unit = self.store.begin()?;
        let receipt = self.pay_within(&mut *unit, ctx, &request, as_of)?;
        ctx.checkpoint()?;
        unit.commit()?;
        Self::log_payment(ctx, &receipt);
        Ok(receipt)
    }

    fn pay_within(
        &self,
        unit: &mut dyn UnitOfWork,
        ctx: &CallContext<'_>,
        request: &PayRequest,
        as_of: NaiveDate,
    ) -> Result<PaymentReceipt> {
        let transaction = unit
            .get_transaction(request.transaction_id)?
            .filter(|t| t.borrower_id == request.borrower_id)
            .ok_or(BillingError::TransactionNotFound {
                id: request.transaction_id,
            })?;

        let payable = unit.list_installments(&InstallmentFilter::payable(
            transaction.id,
            request.borrower_id,
            as_of,
        ))?;
        if payable.is_empty() {
            return Err(BillingError::BillingNotFound {
                transaction_id: transaction.id,
            });
        }

        let allocation = PaymentAllocator::allocate(&payable, request.amount).map_err(|e| {
            log::warn!("[{}] payment on {} refused: {}", ctx.request_id, transaction.id, e);
            e
        })?;

        let mut settled = Vec::with_capacity(allocation.lines.len());
        let mut payments = Vec::with_capacity(allocation.lines.len());
        for mut inst in payable.into_iter().filter(|i| allocation.settles(i.id)) {
            let (principal, interest) = inst.settle(ctx);
            unit.update_installment(&inst)?;
            payments.push(unit.insert_payment(
                NewPayment {
                    transaction_id: transaction.id,
                    installment_id: inst.id,
                    principal_amount: principal,
                    interest_amount: interest,
                },
                AuditInfo::created(ctx),
            )?);
            settled.push(inst);
            ctx.checkpoint()?;
        }

        let remaining = unit.list_installments(&InstallmentFilter::for_transaction(transaction.id))?;
        if remaining.iter().all(Installment::is_settled) {
            unit.mark_transaction_paid(transaction.id, ctx.now(), &ctx.actor)?;
            log::debug!("[{}] transaction {} fully paid", ctx.request_id, transaction.id);
        }
        let transaction = unit
            .get_transaction(transaction.id)?
            .ok_or(BillingError::TransactionNotFound { id: transaction.id })?;

        Ok(PaymentReceipt {
            transaction,
            settled,
            payments,
            amount: allocation.amount,
        })
    }

    fn log_payment(ctx: &CallContext<'_>, receipt: &PaymentReceipt) {
        log::info!(
            "[{}] {} paid on {}, {} installments settled{}",
            ctx.request_id,
            receipt.amount,
            receipt.transaction.invoice_number,
            receipt.settled_count(),
            if receipt.closed_transaction() { ", loan closed" } else { "" }
        );
    }

    // delinquency

    /// Flag overdue installments and escalate borrowers at the limit.
    ///
    /// Every candidate is flagged as checked whether or not its borrower is
    /// escalated. Escalated borrowers move up exactly one level.
    pub fn scan_delinquency(&self, ctx: &CallContext<'_>) -> Result<ScanReport> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin()?;
        let as_of = Self::eod_date(&mut *unit)?;
        let limit = Self::delinquency_limit(&mut *unit)?;

        let candidates = unit.list_installments(&InstallmentFilter::overdue_unchecked(as_of))?;
        let plan = DelinquencyScanner::new(limit).plan(&candidates);
        log::debug!(
            "[{}] scan as of {}: {} candidates, {} borrowers at limit {}",
            ctx.request_id,
            as_of,
            candidates.len(),
            plan.escalations.len(),
            limit
        );

        let borrowers: HashMap<BorrowerId, Borrower> = unit
            .list_borrowers(&plan.escalated_borrowers())?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let mut escalated = Vec::with_capacity(plan.escalations.len());
        for escalation in &plan.escalations {
            let borrower = borrowers
                .get(&escalation.borrower_id)
                .ok_or(BillingError::BorrowerNotRegistered {
                    id: escalation.borrower_id,
                })?;
            let change = LevelChange {
                borrower_id: borrower.id,
                from: borrower.delinquency_level,
                to: borrower.delinquency_level.saturating_add(1),
            };
            unit.update_delinquency_level(borrower.id, change.to, ctx.now(), &ctx.actor)?;

            for (transaction_id, overdue) in &escalation.by_transaction {
                let bills = DelinquencyHistory::bills_from(&overdue.iter().collect::<Vec<_>>())?;
                unit.insert_delinquency_history(*transaction_id, bills, AuditInfo::created(ctx))?;
            }
            escalated.push(change);
            ctx.checkpoint()?;
        }

        for mut inst in candidates {
            inst.mark_checked(ctx);
            unit.update_installment(&inst)?;
        }

        ctx.checkpoint()?;
        unit.commit()?;

        for change in &escalated {
            log::info!(
                "[{}] borrower {} delinquency level {} -> {}",
                ctx.request_id,
                change.borrower_id,
                change.from,
                change.to
            );
        }
        Ok(ScanReport {
            run_id: ctx.request_id,
            as_of,
            limit,
            checked: plan.to_check.len(),
            escalated,
        })
    }

    pub fn delinquency_history(
        &self,
        ctx: &CallContext<'_>,
        transaction_id: TransactionId,
    ) -> Result<Vec<DelinquencyHistory>> {
        ctx.checkpoint()?;
        let mut unit = self.store.begin_read()?;
        unit.list_delinquency_history(transaction_id)
    }
}

fn newest_first(mut payments: Vec<Payment>) -> Vec<Payment> {
    payments.sort_by(|a, b| {
        b.audit
            .created_at
            .cmp(&a.audit.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    payments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelFlag;
    use crate::errors::ErrorKind;
    use crate::store::{Fault, InsertKind, MemoryStore, SqliteStore, Tripwire};
    use crate::types::{RepaymentUnit, TransactionStatus};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// engine seeded with settings, one borrower and a weekly 10% x 4 product
    struct Fixture<S: Store> {
        engine: BillingEngine<S>,
        time: SafeTimeProvider,
        borrower: Borrower,
        product: LoanProduct,
    }

    impl Fixture<MemoryStore> {
        fn memory() -> Self {
            Self::with_store(MemoryStore::new())
        }
    }

    impl<S: Store> Fixture<S> {
        fn with_store(store: S) -> Self {
            Self::with_config(store, EngineConfig::default())
        }

        fn with_config(store: S, config: EngineConfig) -> Self {
            let time = SafeTimeProvider::new(TimeSource::Test(
                Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            ));
            let engine = BillingEngine::new(store, config).unwrap();
            let (borrower, product) = {
                let ctx = CallContext::new("tester", &time);
                engine.put_setting(&ctx, EOD_DATE_SETTING, "2024-01-01").unwrap();
                engine.put_setting(&ctx, DELINQUENCY_LIMIT_SETTING, "2").unwrap();
                let borrower = engine
                    .register_borrower(&ctx, NewBorrower::new("Ayu", "ayu@example.com", "hash"))
                    .unwrap();
                let product = engine
                    .create_loan_product(&ctx, NewLoanProduct::weekly("Mingguan", dec!(10), 4))
                    .unwrap();
                (borrower, product)
            };
            Self {
                engine,
                time,
                borrower,
                product,
            }
        }

        fn ctx(&self) -> CallContext<'_> {
            CallContext::new("tester", &self.time)
        }

        fn request(&self) -> CreateTransactionRequest {
            CreateTransactionRequest::new(self.borrower.id, self.product.id, Money::from_major(1000))
        }

        fn issue(&self) -> CreatedTransaction {
            self.engine.create_transaction(&self.ctx(), self.request()).unwrap()
        }

        fn set_eod(&self, value: &str) {
            self.engine.put_setting(&self.ctx(), EOD_DATE_SETTING, value).unwrap();
        }

        fn pay(&self, tx: &LoanTransaction, amount: i64) -> Result<PaymentReceipt> {
            self.engine.pay(
                &self.ctx(),
                PayRequest::new(tx.id, tx.borrower_id, Money::from_major(amount)),
            )
        }

        fn level(&self, borrower_id: BorrowerId) -> u32 {
            self.engine
                .get_borrower(&self.ctx(), borrower_id)
                .unwrap()
                .delinquency_level
        }

        fn set_level(&self, borrower_id: BorrowerId, level: u32) {
            let mut unit = self.engine.store().begin().unwrap();
            unit.update_delinquency_level(borrower_id, level, Utc::now(), "tester")
                .unwrap();
            unit.commit().unwrap();
        }

        fn transaction_count(&self) -> usize {
            self.engine.list_transactions(&self.ctx(), None, false).unwrap().len()
        }
    }

    #[test]
    fn test_create_transaction_schedules_installments() {
        let fx = Fixture::memory();
        let created = fx.issue();

        let tx = &created.transaction;
        assert_eq!(tx.invoice_number, format!("LOAN/{}/{}", tx.id, fx.borrower.id));
        assert_eq!(tx.status, TransactionStatus::Unpaid);
        assert_eq!(tx.product_snapshot["name"], "Mingguan");
        assert!(tx.borrower_snapshot.get("password_hash").is_none());

        assert_eq!(created.installments.len(), 4);
        for (k, inst) in created.installments.iter().enumerate() {
            assert_eq!(inst.due_date, date(2024, 1, 1) + chrono::Duration::days(7 * (k as i64 + 1)));
            assert_eq!(inst.principal_due, Money::from_decimal(dec!(250.00)));
            assert_eq!(inst.interest_due, Money::from_decimal(dec!(25.00)));
            assert!(inst.is_untouched());
        }

        let stored = fx.engine.get_transaction(&fx.ctx(), tx.id).unwrap();
        assert_eq!(stored.transaction.invoice_number, tx.invoice_number);
        assert!(stored.payments.is_empty());
        assert_eq!(fx.engine.installments(&fx.ctx(), tx.id).unwrap(), created.installments);
    }

    #[test]
    fn test_delinquent_borrower_cannot_borrow() {
        let fx = Fixture::memory();
        fx.set_level(fx.borrower.id, 1);

        let err = fx.engine.create_transaction(&fx.ctx(), fx.request()).unwrap_err();
        assert!(matches!(err, BillingError::BorrowerDelinquent { level: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::PolicyViolation);
        assert_eq!(err.to_string(), "this user is delinquent and cannot process loan transaction!");
        assert_eq!(fx.transaction_count(), 0);
    }

    #[test]
    fn test_one_open_loan_per_borrower() {
        let fx = Fixture::memory();
        fx.issue();

        let err = fx.engine.create_transaction(&fx.ctx(), fx.request()).unwrap_err();
        assert!(matches!(err, BillingError::TransactionLimit { .. }));
        assert_eq!(fx.transaction_count(), 1);
    }

    #[test]
    fn test_create_transaction_lookup_failures() {
        let fx = Fixture::memory();
        let ctx = fx.ctx();

        let unknown_borrower = CreateTransactionRequest::new(99, fx.product.id, Money::from_major(1000));
        assert!(matches!(
            fx.engine.create_transaction(&ctx, unknown_borrower),
            Err(BillingError::BorrowerNotRegistered { id: 99 })
        ));

        let unknown_product = CreateTransactionRequest::new(fx.borrower.id, 99, Money::from_major(1000));
        assert!(matches!(
            fx.engine.create_transaction(&ctx, unknown_product),
            Err(BillingError::LoanProductNotFound { id: 99 })
        ));

        let zero = CreateTransactionRequest::new(fx.borrower.id, fx.product.id, Money::ZERO);
        assert!(matches!(
            fx.engine.create_transaction(&ctx, zero),
            Err(BillingError::Validation { field: "amount", .. })
        ));
    }

    #[test]
    fn test_missing_eod_setting_is_a_configuration_error() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc::now()));
        let ctx = CallContext::new("tester", &time);
        let engine = BillingEngine::new(MemoryStore::new(), EngineConfig::default()).unwrap();
        let borrower = engine
            .register_borrower(&ctx, NewBorrower::new("Budi", "budi@example.com", "hash"))
            .unwrap();
        let product = engine
            .create_loan_product(&ctx, NewLoanProduct::weekly("Mingguan", dec!(10), 4))
            .unwrap();

        let err = engine
            .create_transaction(
                &ctx,
                CreateTransactionRequest::new(borrower.id, product.id, Money::from_major(1000)),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::SettingNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        assert!(matches!(
            engine.put_setting(&ctx, EOD_DATE_SETTING, "01/02/2024"),
            Err(BillingError::InvalidEodDate { .. })
        ));
        assert!(matches!(
            engine.put_setting(&ctx, DELINQUENCY_LIMIT_SETTING, "-1"),
            Err(BillingError::InvalidDelinquencyLimit { .. })
        ));
    }

    #[test]
    fn test_unavailable_repayment_unit_rolls_back() {
        let fx = Fixture::memory();
        let mut monthly = NewLoanProduct::weekly("Bulanan", dec!(2), 12);
        monthly.repayment_unit = RepaymentUnit::Month;
        let product = fx.engine.create_loan_product(&fx.ctx(), monthly).unwrap();

        let err = fx
            .engine
            .create_transaction(
                &fx.ctx(),
                CreateTransactionRequest::new(fx.borrower.id, product.id, Money::from_major(1000)),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::RepaymentUnitNotAvailable { .. }));
        assert_eq!(fx.transaction_count(), 0);

        // the borrower is not blocked by the aborted loan
        fx.issue();
    }

    #[test]
    fn test_installment_insert_failure_rolls_back() {
        let fx = Fixture::memory();
        fx.engine.store().inject_fault(Fault::InstallmentInsert { after: 2 });

        let err = fx.engine.create_transaction(&fx.ctx(), fx.request()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(fx.transaction_count(), 0);

        let created = fx.issue();
        assert_eq!(created.installments.len(), 4);
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let fx = Fixture::memory();
        fx.engine.store().inject_fault(Fault::Commit);

        assert!(fx.engine.create_transaction(&fx.ctx(), fx.request()).is_err());
        assert_eq!(fx.transaction_count(), 0);
    }

    #[test]
    fn test_cancelled_call_writes_nothing() {
        let fx = Fixture::memory();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let ctx = fx.ctx().with_cancel(cancel);
        assert!(matches!(
            fx.engine.create_transaction(&ctx, fx.request()),
            Err(BillingError::Cancelled)
        ));

        let expired = fx.ctx().with_timeout(Duration::ZERO);
        assert!(matches!(
            fx.engine.create_transaction(&expired, fx.request()),
            Err(BillingError::DeadlineExceeded)
        ));
        assert_eq!(fx.transaction_count(), 0);
    }

    #[test]
    fn test_cancel_after_installment_inserts_rolls_back() {
        let fx = Fixture::memory();
        let cancel = CancelFlag::new();
        fx.engine.store().arm_tripwire(Tripwire {
            kind: InsertKind::Installment,
            after: 2,
            flag: cancel.clone(),
        });

        let ctx = fx.ctx().with_cancel(cancel.clone());
        assert!(matches!(
            fx.engine.create_transaction(&ctx, fx.request()),
            Err(BillingError::Cancelled)
        ));
        assert!(cancel.is_cancelled());

        assert_eq!(fx.transaction_count(), 0);
        let outstanding = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert!(outstanding.is_fully_paid());
        assert_eq!(outstanding.next_due_date, None);

        // nothing half-written blocks the borrower
        assert_eq!(fx.issue().installments.len(), 4);
    }

    #[test]
    fn test_cancel_after_payment_insert_rolls_back() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-15");

        let cancel = CancelFlag::new();
        fx.engine.store().arm_tripwire(Tripwire {
            kind: InsertKind::Payment,
            after: 1,
            flag: cancel.clone(),
        });
        let ctx = fx.ctx().with_cancel(cancel);
        assert!(matches!(
            fx.engine.pay(
                &ctx,
                PayRequest::new(created.transaction.id, fx.borrower.id, Money::from_major(550)),
            ),
            Err(BillingError::Cancelled)
        ));

        let rows = fx.engine.installments(&fx.ctx(), created.transaction.id).unwrap();
        assert!(rows.iter().all(Installment::is_untouched));
        let stored = fx.engine.get_transaction(&fx.ctx(), created.transaction.id).unwrap();
        assert!(stored.payments.is_empty());
        assert_eq!(stored.transaction.status, TransactionStatus::Unpaid);
    }

    #[test]
    fn test_principal_too_large_to_bill_is_rejected() {
        let fx = Fixture::memory();
        let huge = CreateTransactionRequest::new(
            fx.borrower.id,
            fx.product.id,
            Money::from_decimal(Decimal::MAX),
        );

        let err = fx.engine.create_transaction(&fx.ctx(), huge).unwrap_err();
        assert!(matches!(err, BillingError::Validation { field: "amount", .. }));
        assert_eq!(fx.transaction_count(), 0);

        let outstanding = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert_eq!(outstanding.total_outstanding, Money::ZERO);
    }

    #[test]
    fn test_pay_two_installments_exactly() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-15");

        let receipt = fx.pay(&created.transaction, 550).unwrap();
        assert_eq!(receipt.settled_count(), 2);
        assert_eq!(receipt.payments.len(), 2);
        assert!(!receipt.closed_transaction());
        for payment in &receipt.payments {
            assert_eq!(payment.principal_amount, Money::from_major(250));
            assert_eq!(payment.interest_amount, Money::from_major(25));
        }

        let rows = fx.engine.installments(&fx.ctx(), created.transaction.id).unwrap();
        assert!(rows[0].is_settled());
        assert!(rows[1].is_settled());
        assert!(rows[2].is_untouched());
        assert!(rows[3].is_untouched());

        let stored = fx.engine.get_transaction(&fx.ctx(), created.transaction.id).unwrap();
        assert_eq!(stored.payments.len(), 2);
        assert_eq!(stored.payments[0].installment_id, rows[1].id);
    }

    #[test]
    fn test_pay_amount_off_by_one_unit_rolls_back() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-15");

        let err = fx.pay(&created.transaction, 276).unwrap_err();
        assert!(matches!(err, BillingError::AmountNotMatch { .. }));
        assert_eq!(err.kind(), ErrorKind::PolicyViolation);

        let rows = fx.engine.installments(&fx.ctx(), created.transaction.id).unwrap();
        assert!(rows.iter().all(Installment::is_untouched));
        let stored = fx.engine.get_transaction(&fx.ctx(), created.transaction.id).unwrap();
        assert!(stored.payments.is_empty());
    }

    #[test]
    fn test_payment_insert_failure_rolls_back() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-15");
        fx.engine.store().inject_fault(Fault::PaymentInsert { after: 1 });

        assert!(fx.pay(&created.transaction, 550).is_err());
        let rows = fx.engine.installments(&fx.ctx(), created.transaction.id).unwrap();
        assert!(rows.iter().all(Installment::is_untouched));
    }

    #[test]
    fn test_pay_before_anything_is_due() {
        let fx = Fixture::memory();
        let created = fx.issue();

        let err = fx.pay(&created.transaction, 275).unwrap_err();
        assert!(matches!(err, BillingError::BillingNotFound { .. }));
        assert_eq!(err.to_string(), "loan billing not found");
    }

    #[test]
    fn test_pay_someone_elses_transaction() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-15");
        let other = fx
            .engine
            .register_borrower(&fx.ctx(), NewBorrower::new("Citra", "citra@example.com", "hash"))
            .unwrap();

        let err = fx
            .engine
            .pay(
                &fx.ctx(),
                PayRequest::new(created.transaction.id, other.id, Money::from_major(275)),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::TransactionNotFound { .. }));
    }

    #[test]
    fn test_final_payment_closes_the_loan() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-29");

        let receipt = fx.pay(&created.transaction, 1100).unwrap();
        assert!(receipt.closed_transaction());
        assert_eq!(receipt.transaction.status, TransactionStatus::Paid);

        let outstanding = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert!(outstanding.is_fully_paid());

        // a closed loan frees the borrower
        let next = fx.issue();
        assert_ne!(next.transaction.id, created.transaction.id);
    }

    #[test]
    fn test_pay_as_of_explicit_date() {
        let fx = Fixture::memory();
        let created = fx.issue();

        let receipt = fx
            .engine
            .pay_as_of(
                &fx.ctx(),
                PayRequest::new(created.transaction.id, fx.borrower.id, Money::from_major(275)),
                date(2024, 1, 8),
            )
            .unwrap();
        assert_eq!(receipt.settled_count(), 1);
    }

    #[test]
    fn test_outstanding_as_of_eod() {
        let fx = Fixture::memory();
        fx.issue();
        fx.set_eod("2024-01-15");

        let first = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert_eq!(first.as_of, date(2024, 1, 15));
        assert_eq!(first.current_due_date, Some(date(2024, 1, 8)));
        assert_eq!(first.next_due_date, Some(date(2024, 1, 22)));
        assert_eq!(first.total_billed, Money::from_major(550));
        assert_eq!(first.total_outstanding, Money::from_major(1100));
        assert_eq!(first.current_installments.len(), 2);

        let second = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert_eq!(first, second);

        let later = fx
            .engine
            .calculate_outstanding_as_of(&fx.ctx(), fx.borrower.id, date(2024, 2, 1))
            .unwrap();
        assert_eq!(later.total_billed, Money::from_major(1100));
        assert_eq!(later.next_due_date, None);

        assert!(matches!(
            fx.engine.calculate_outstanding(&fx.ctx(), 99),
            Err(BillingError::BorrowerNotRegistered { id: 99 })
        ));
    }

    #[test]
    fn test_outstanding_ignores_paid_off_loans() {
        let config = EngineConfig {
            installment_page_size: 4,
            ..EngineConfig::default()
        };
        let fx = Fixture::with_config(MemoryStore::new(), config);
        let first = fx.issue();
        fx.set_eod("2024-01-29");
        assert!(fx.pay(&first.transaction, 1100).unwrap().closed_transaction());

        // the settled rows of the first loan alone fill a page
        let second = fx.issue();
        let out = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert_eq!(out.total_outstanding, Money::from_major(1100));
        assert_eq!(out.next_due_date, Some(date(2024, 2, 5)));
        assert!(!out.is_fully_paid());
        assert!(out.current_installments.is_empty());

        fx.set_eod("2024-02-05");
        let out = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert_eq!(out.current_installments.len(), 1);
        assert_eq!(out.current_installments[0].transaction_id, second.transaction.id);
        assert_eq!(out.total_billed, Money::from_major(275));
    }

    #[test]
    fn test_scan_escalates_once_per_run() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-15");

        let report = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(
            report.escalated,
            vec![LevelChange {
                borrower_id: fx.borrower.id,
                from: 0,
                to: 1
            }]
        );
        assert_eq!(fx.level(fx.borrower.id), 1);

        let history = fx
            .engine
            .delinquency_history(&fx.ctx(), created.transaction.id)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].bills.as_array().map(Vec::len), Some(2));

        // same data, nothing left to count
        let again = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(again.checked, 0);
        assert!(again.escalated.is_empty());
        assert_eq!(fx.level(fx.borrower.id), 1);

        // two more weeks overdue raise the level by one more
        fx.set_eod("2024-01-29");
        let later = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(later.checked, 2);
        assert_eq!(fx.level(fx.borrower.id), 2);
    }

    #[test]
    fn test_scan_below_limit_only_flags() {
        let fx = Fixture::memory();
        fx.issue();
        fx.set_eod("2024-01-08");

        let report = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(report.checked, 1);
        assert!(report.escalated.is_empty());
        assert_eq!(fx.level(fx.borrower.id), 0);

        // the flagged installment no longer counts towards the limit
        fx.set_eod("2024-01-15");
        let report = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(fx.level(fx.borrower.id), 0);
    }

    #[test]
    fn test_paid_installments_are_not_delinquent() {
        let fx = Fixture::memory();
        let created = fx.issue();
        fx.set_eod("2024-01-15");
        fx.pay(&created.transaction, 550).unwrap();

        let report = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(report.checked, 0);
        assert_eq!(fx.level(fx.borrower.id), 0);
    }

    #[test]
    fn test_scan_failure_rolls_back_every_flag() {
        let fx = Fixture::memory();
        fx.issue();
        fx.set_eod("2024-01-15");
        fx.engine.store().inject_fault(Fault::BorrowerUpdate);

        assert!(fx.engine.scan_delinquency(&fx.ctx()).is_err());
        assert_eq!(fx.level(fx.borrower.id), 0);

        let retry = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(retry.checked, 2);
        assert_eq!(fx.level(fx.borrower.id), 1);
    }

    #[test]
    fn test_scan_without_limit_setting() {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc::now()));
        let ctx = CallContext::system(&time);
        let engine = BillingEngine::new(MemoryStore::new(), EngineConfig::default()).unwrap();
        engine.put_setting(&ctx, EOD_DATE_SETTING, "2024-01-15").unwrap();

        let err = engine.scan_delinquency(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_list_transactions_with_payments() {
        let fx = Fixture::memory();
        let first = fx.issue();
        fx.set_eod("2024-01-29");
        fx.pay(&first.transaction, 1100).unwrap();
        let second = fx.issue();

        let listed = fx
            .engine
            .list_transactions(&fx.ctx(), Some(fx.borrower.id), true)
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].transaction.id, second.transaction.id);
        assert!(listed[0].payments.is_empty());
        assert_eq!(listed[1].payments.len(), 4);
        assert!(listed[1].payments[0].id > listed[1].payments[3].id);

        let bare = fx.engine.list_transactions(&fx.ctx(), None, false).unwrap();
        assert!(bare.iter().all(|t| t.payments.is_empty()));
    }

    #[test]
    fn test_duplicate_registration() {
        let fx = Fixture::memory();
        let err = fx
            .engine
            .register_borrower(&fx.ctx(), NewBorrower::new("Ayu", "ayu@example.com", "other"))
            .unwrap_err();
        assert_eq!(err.to_string(), "user already registered");
    }

    #[test]
    fn test_sqlite_loan_lifecycle() {
        let fx = Fixture::with_store(SqliteStore::in_memory().unwrap());
        let created = fx.issue();
        assert_eq!(created.installments.len(), 4);

        fx.set_eod("2024-01-15");
        assert!(matches!(
            fx.pay(&created.transaction, 276),
            Err(BillingError::AmountNotMatch { .. })
        ));
        let receipt = fx.pay(&created.transaction, 275).unwrap();
        assert_eq!(receipt.settled_count(), 1);

        let outstanding = fx.engine.calculate_outstanding(&fx.ctx(), fx.borrower.id).unwrap();
        assert_eq!(outstanding.total_billed, Money::from_major(275));
        assert_eq!(outstanding.total_outstanding, Money::from_major(825));

        fx.set_eod("2024-01-22");
        let report = fx.engine.scan_delinquency(&fx.ctx()).unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(fx.level(fx.borrower.id), 1);
        assert!(matches!(
            fx.engine.create_transaction(&fx.ctx(), fx.request()),
            Err(BillingError::BorrowerDelinquent { .. })
        ));
    }

    #[test]
    fn test_concurrent_loans_for_one_borrower() {
        let fx = Fixture::with_store(SqliteStore::in_memory().unwrap());
        let engine = &fx.engine;
        let request = fx.request();

        let outcomes: Vec<Result<CreatedTransaction>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let request = request.clone();
                    scope.spawn(move || {
                        let time = SafeTimeProvider::new(TimeSource::System);
                        let ctx = CallContext::new("racer", &time);
                        engine.create_transaction(&ctx, request)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BillingError::TransactionLimit { .. })));
        assert_eq!(fx.transaction_count(), 1);
    }
}
