//! SQLite persistence.
//!
//! Money is stored as exact decimal text, due dates as `YYYY-MM-DD` text.
//! Units of work run under `BEGIN IMMEDIATE` on a mutex-guarded connection,
//! read-only units under `BEGIN DEFERRED`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use rust_decimal::Decimal;
use std::sync::{Mutex, MutexGuard};

use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};
use crate::model::{
    AuditInfo, Borrower, DelinquencyHistory, Installment, InstallmentFilter, LoanProduct,
    LoanTransaction, NewBorrower, NewInstallment, NewLoanProduct, NewPayment, NewTransaction,
    Payment, Setting,
};
use crate::types::{BorrowerId, LoanProductId, RepaymentUnit, TransactionId, TransactionStatus};

use super::{
    BorrowerRepository, DelinquencyHistoryRepository, InstallmentRepository,
    LoanProductRepository, PaymentRepository, SettingRepository, Store, TransactionRepository,
    UnitOfWork,
};

const SCHEMA: &str = include_str!("schema.sql");

const AUDIT_COLUMNS: &str =
    "created_at, created_by, updated_at, updated_by, deleted_at, deleted_by, is_deleted";

const BORROWER_COLUMNS: &str = "id, name, email, password, delinquent_level";
const PRODUCT_COLUMNS: &str =
    "id, name, description, interest_rate, repayment_type, repayment_duration";
const SETTING_COLUMNS: &str = "id, name, value";
const TRANSACTION_COLUMNS: &str =
    "id, invoice_number, notes, user_id, user, loan_id, loan, amount, status";
const INSTALLMENT_COLUMNS: &str = "id, loan_transaction_id, user_id, bill_date, principal_amount, \
     principal_amount_paid, interest_amount, interest_amount_paid, is_checked_for_delinquent";
const PAYMENT_COLUMNS: &str =
    "id, loan_transaction_id, loan_billing_id, principal_amount, interest_amount";
const HISTORY_COLUMNS: &str = "id, loan_transaction_id, bills";

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_decimal().normalize().to_string()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(_) => {
                Money::from_str_exact(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
            ValueRef::Integer(i) => Ok(Money::from_major(i)),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// date-only part of a stored date, tolerating a trailing time of day
fn parse_due_date(idx: usize, text: &str) -> rusqlite::Result<NaiveDate> {
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn audit_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<AuditInfo> {
    Ok(AuditInfo {
        created_at: row.get(at)?,
        created_by: row.get(at + 1)?,
        updated_at: row.get(at + 2)?,
        updated_by: row.get(at + 3)?,
        deleted_at: row.get(at + 4)?,
        deleted_by: row.get(at + 5)?,
        is_deleted: row.get(at + 6)?,
    })
}

fn borrower_from_row(row: &Row<'_>) -> rusqlite::Result<Borrower> {
    Ok(Borrower {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        delinquency_level: row.get(4)?,
        audit: audit_from_row(row, 5)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<LoanProduct> {
    let rate_text: String = row.get(3)?;
    let rate_percent: Decimal = rate_text.trim().parse().map_err(|e| conversion_error(3, e))?;
    let unit: String = row.get(4)?;
    Ok(LoanProduct {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        interest_rate: Rate::from_percent_decimal(rate_percent),
        repayment_unit: RepaymentUnit::from(unit),
        repayment_count: row.get(5)?,
        audit: audit_from_row(row, 6)?,
    })
}

fn setting_from_row(row: &Row<'_>) -> rusqlite::Result<Setting> {
    Ok(Setting {
        id: row.get(0)?,
        name: row.get(1)?,
        value: row.get(2)?,
        audit: audit_from_row(row, 3)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<LoanTransaction> {
    let status: String = row.get(8)?;
    let status = TransactionStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            Type::Text,
            format!("unknown transaction status {}", status).into(),
        )
    })?;
    Ok(LoanTransaction {
        id: row.get(0)?,
        invoice_number: row.get(1)?,
        notes: row.get(2)?,
        borrower_id: row.get(3)?,
        borrower_snapshot: row.get(4)?,
        loan_product_id: row.get(5)?,
        product_snapshot: row.get(6)?,
        amount: row.get(7)?,
        status,
        audit: audit_from_row(row, 9)?,
    })
}

fn installment_from_row(row: &Row<'_>) -> rusqlite::Result<Installment> {
    let due: String = row.get(3)?;
    Ok(Installment {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        borrower_id: row.get(2)?,
        due_date: parse_due_date(3, &due)?,
        principal_due: row.get(4)?,
        principal_paid: row.get(5)?,
        interest_due: row.get(6)?,
        interest_paid: row.get(7)?,
        checked_for_delinquency: row.get(8)?,
        audit: audit_from_row(row, 9)?,
    })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        installment_id: row.get(2)?,
        principal_amount: row.get(3)?,
        interest_amount: row.get(4)?,
        audit: audit_from_row(row, 5)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<DelinquencyHistory> {
    Ok(DelinquencyHistory {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        bills: row.get(2)?,
        audit: audit_from_row(row, 3)?,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// production store backed by one SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// open (or create) the database at `path` and apply the schema
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SqliteStore {
    fn open_unit(&self, begin: &str) -> Result<Box<dyn UnitOfWork + '_>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| BillingError::store("sqlite connection lock poisoned"))?;
        conn.execute_batch(begin)?;
        Ok(Box::new(SqliteUnit {
            conn,
            finished: false,
        }))
    }
}

impl Store for SqliteStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        self.open_unit("BEGIN IMMEDIATE")
    }

    /// takes no write lock on the database file until something writes
    fn begin_read(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        self.open_unit("BEGIN DEFERRED")
    }
}

struct SqliteUnit<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteUnit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::error!("sqlite rollback failed: {}", e);
            }
        }
    }
}

impl UnitOfWork for SqliteUnit<'_> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl SqliteUnit<'_> {
    fn audit_params(audit: &AuditInfo) -> [&dyn ToSql; 7] {
        [
            &audit.created_at,
            &audit.created_by,
            &audit.updated_at,
            &audit.updated_by,
            &audit.deleted_at,
            &audit.deleted_by,
            &audit.is_deleted,
        ]
    }

    fn select_one<T>(
        &self,
        sql: &str,
        args: &[&dyn ToSql],
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.query_row(args, map).optional()?)
    }

    fn select_many<T, P: rusqlite::Params>(
        &self,
        sql: &str,
        args: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }

    fn stamp_update(
        &self,
        table: &str,
        id: i64,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<usize> {
        let sql = format!(
            "UPDATE {} SET updated_at = ?1, updated_by = ?2 WHERE id = ?3 AND is_deleted = 0",
            table
        );
        Ok(self.conn.execute(&sql, params![updated_at, updated_by, id])?)
    }
}

impl SettingRepository for SqliteUnit<'_> {
    fn get_setting(&mut self, name: &str) -> Result<Option<Setting>> {
        let sql = format!(
            "SELECT {}, {} FROM settings WHERE name = ?1 AND is_deleted = 0",
            SETTING_COLUMNS, AUDIT_COLUMNS
        );
        self.select_one(&sql, &[&name], setting_from_row)
    }

    fn put_setting(&mut self, name: &str, value: &str, audit: AuditInfo) -> Result<Setting> {
        if let Some(existing) = self.get_setting(name)? {
            self.conn.execute(
                "UPDATE settings SET value = ?1 WHERE id = ?2",
                params![value, existing.id],
            )?;
            self.stamp_update("settings", existing.id, audit.created_at, &audit.created_by)?;
        } else {
            let sql = format!(
                "INSERT INTO settings (name, value, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                AUDIT_COLUMNS
            );
            let mut args: Vec<&dyn ToSql> = vec![&name, &value];
            args.extend(Self::audit_params(&audit));
            self.conn.execute(&sql, args.as_slice())?;
        }

        self.get_setting(name)?
            .ok_or_else(|| BillingError::store(format!("setting {} vanished after write", name)))
    }
}

impl BorrowerRepository for SqliteUnit<'_> {
    fn insert_borrower(&mut self, borrower: NewBorrower, audit: AuditInfo) -> Result<Borrower> {
        let sql = format!(
            "INSERT INTO users (name, email, password, delinquent_level, {}) \
             VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?)",
            AUDIT_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![&borrower.name, &borrower.email, &borrower.password_hash];
        args.extend(Self::audit_params(&audit));

        match self.conn.execute(&sql, args.as_slice()) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(BillingError::BorrowerAlreadyRegistered {
                    email: borrower.email,
                })
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Borrower {
            id: self.conn.last_insert_rowid(),
            name: borrower.name,
            email: borrower.email,
            password_hash: borrower.password_hash,
            delinquency_level: 0,
            audit,
        })
    }

    fn get_borrower(&mut self, id: BorrowerId) -> Result<Option<Borrower>> {
        let sql = format!(
            "SELECT {}, {} FROM users WHERE id = ?1 AND is_deleted = 0",
            BORROWER_COLUMNS, AUDIT_COLUMNS
        );
        self.select_one(&sql, &[&id], borrower_from_row)
    }

    fn find_borrower_by_email(&mut self, email: &str) -> Result<Option<Borrower>> {
        let sql = format!(
            "SELECT {}, {} FROM users WHERE email = ?1 AND is_deleted = 0",
            BORROWER_COLUMNS, AUDIT_COLUMNS
        );
        self.select_one(&sql, &[&email], borrower_from_row)
    }

    fn list_borrowers(&mut self, ids: &[BorrowerId]) -> Result<Vec<Borrower>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {}, {} FROM users WHERE is_deleted = 0 AND id IN ({}) ORDER BY id",
            BORROWER_COLUMNS,
            AUDIT_COLUMNS,
            placeholders(ids.len())
        );
        self.select_many(&sql, params_from_iter(ids.iter()), borrower_from_row)
    }

    fn update_delinquency_level(
        &mut self,
        id: BorrowerId,
        level: u32,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE users SET delinquent_level = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![level, id],
        )?;
        if changed == 0 {
            return Err(BillingError::BorrowerNotRegistered { id });
        }
        self.stamp_update("users", id, updated_at, updated_by)?;
        Ok(())
    }
}

impl LoanProductRepository for SqliteUnit<'_> {
    fn insert_product(&mut self, product: NewLoanProduct, audit: AuditInfo) -> Result<LoanProduct> {
        let sql = format!(
            "INSERT INTO loans (name, description, interest_rate, repayment_type, repayment_duration, {}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            AUDIT_COLUMNS
        );
        let rate = product.interest_rate_percent.normalize().to_string();
        let unit = product.repayment_unit.as_str().to_string();
        let mut args: Vec<&dyn ToSql> = vec![
            &product.name,
            &product.description,
            &rate,
            &unit,
            &product.repayment_count,
        ];
        args.extend(Self::audit_params(&audit));
        self.conn.execute(&sql, args.as_slice())?;

        let interest_rate = product.interest_rate();
        Ok(LoanProduct {
            id: self.conn.last_insert_rowid(),
            name: product.name,
            description: product.description,
            interest_rate,
            repayment_unit: product.repayment_unit,
            repayment_count: product.repayment_count,
            audit,
        })
    }

    fn get_product(&mut self, id: LoanProductId) -> Result<Option<LoanProduct>> {
        let sql = format!(
            "SELECT {}, {} FROM loans WHERE id = ?1 AND is_deleted = 0",
            PRODUCT_COLUMNS, AUDIT_COLUMNS
        );
        self.select_one(&sql, &[&id], product_from_row)
    }
}

impl TransactionRepository for SqliteUnit<'_> {
    fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
        audit: AuditInfo,
    ) -> Result<LoanTransaction> {
        let sql = format!(
            "INSERT INTO loan_transactions (notes, user_id, user, loan_id, loan, amount, status, {}) \
             VALUES (?, ?, ?, ?, ?, ?, 'unpaid', ?, ?, ?, ?, ?, ?, ?)",
            AUDIT_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![
            &transaction.notes,
            &transaction.borrower_id,
            &transaction.borrower_snapshot,
            &transaction.loan_product_id,
            &transaction.product_snapshot,
            &transaction.amount,
        ];
        args.extend(Self::audit_params(&audit));

        match self.conn.execute(&sql, args.as_slice()) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(BillingError::TransactionLimit {
                    borrower_id: transaction.borrower_id,
                })
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        Ok(transaction.into_transaction(id, audit))
    }

    fn set_invoice_number(
        &mut self,
        id: TransactionId,
        invoice_number: &str,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE loan_transactions SET invoice_number = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![invoice_number, id],
        )?;
        if changed == 0 {
            return Err(BillingError::TransactionNotFound { id });
        }
        self.stamp_update("loan_transactions", id, updated_at, updated_by)?;
        Ok(())
    }

    fn mark_transaction_paid(
        &mut self,
        id: TransactionId,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE loan_transactions SET status = ?1 WHERE id = ?2 AND is_deleted = 0",
            params![TransactionStatus::Paid.as_str(), id],
        )?;
        if changed == 0 {
            return Err(BillingError::TransactionNotFound { id });
        }
        self.stamp_update("loan_transactions", id, updated_at, updated_by)?;
        Ok(())
    }

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<LoanTransaction>> {
        let sql = format!(
            "SELECT {}, {} FROM loan_transactions WHERE id = ?1 AND is_deleted = 0",
            TRANSACTION_COLUMNS, AUDIT_COLUMNS
        );
        self.select_one(&sql, &[&id], transaction_from_row)
    }

    fn find_open_transaction(&mut self, borrower_id: BorrowerId) -> Result<Option<LoanTransaction>> {
        let sql = format!(
            "SELECT {}, {} FROM loan_transactions \
             WHERE user_id = ?1 AND status = 'unpaid' AND is_deleted = 0",
            TRANSACTION_COLUMNS, AUDIT_COLUMNS
        );
        self.select_one(&sql, &[&borrower_id], transaction_from_row)
    }

    fn list_transactions(&mut self, borrower_id: Option<BorrowerId>) -> Result<Vec<LoanTransaction>> {
        let sql = format!(
            "SELECT {}, {} FROM loan_transactions \
             WHERE is_deleted = 0 AND (?1 IS NULL OR user_id = ?1) ORDER BY id DESC",
            TRANSACTION_COLUMNS, AUDIT_COLUMNS
        );
        self.select_many(&sql, params![borrower_id], transaction_from_row)
    }
}

impl InstallmentRepository for SqliteUnit<'_> {
    fn insert_installment(
        &mut self,
        installment: NewInstallment,
        audit: AuditInfo,
    ) -> Result<Installment> {
        let sql = format!(
            "INSERT INTO loan_billings (loan_transaction_id, user_id, bill_date, principal_amount, \
             principal_amount_paid, interest_amount, interest_amount_paid, is_checked_for_delinquent, {}) \
             VALUES (?, ?, ?, ?, '0', ?, '0', 0, ?, ?, ?, ?, ?, ?, ?)",
            AUDIT_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![
            &installment.transaction_id,
            &installment.borrower_id,
            &installment.due_date,
            &installment.principal_due,
            &installment.interest_due,
        ];
        args.extend(Self::audit_params(&audit));
        self.conn.execute(&sql, args.as_slice())?;

        let id = self.conn.last_insert_rowid();
        Ok(installment.into_installment(id, audit))
    }

    fn list_installments(&mut self, filter: &InstallmentFilter) -> Result<Vec<Installment>> {
        let mut clauses = vec!["is_deleted = 0".to_string()];
        let mut args: Vec<Value> = Vec::new();

        if let Some(id) = filter.transaction_id {
            args.push(Value::Integer(id));
            clauses.push(format!("loan_transaction_id = ?{}", args.len()));
        }
        if let Some(id) = filter.borrower_id {
            args.push(Value::Integer(id));
            clauses.push(format!("user_id = ?{}", args.len()));
        }
        if let Some(date) = filter.due_on_or_before {
            args.push(Value::Text(date.format("%Y-%m-%d").to_string()));
            clauses.push(format!("date(bill_date) <= ?{}", args.len()));
        }
        if filter.unchecked_only {
            clauses.push("is_checked_for_delinquent = 0".to_string());
        }

        let sql = format!(
            "SELECT {}, {} FROM loan_billings WHERE {} ORDER BY date(bill_date) ASC, id ASC",
            INSTALLMENT_COLUMNS,
            AUDIT_COLUMNS,
            clauses.join(" AND ")
        );

        // paid legs are decimal text, compared after decoding
        let mut found: Vec<Installment> = self
            .select_many(&sql, params_from_iter(args.iter()), installment_from_row)?
            .into_iter()
            .filter(|i| filter.matches(i))
            .collect();
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    fn update_installment(&mut self, installment: &Installment) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE loan_billings SET principal_amount_paid = ?1, interest_amount_paid = ?2, \
             is_checked_for_delinquent = ?3, updated_at = ?4, updated_by = ?5 \
             WHERE id = ?6 AND is_deleted = 0",
            params![
                installment.principal_paid,
                installment.interest_paid,
                installment.checked_for_delinquency,
                installment.audit.updated_at,
                installment.audit.updated_by,
                installment.id,
            ],
        )?;
        if changed == 0 {
            return Err(BillingError::store(format!("installment {} missing", installment.id)));
        }
        Ok(())
    }
}

impl PaymentRepository for SqliteUnit<'_> {
    fn insert_payment(&mut self, payment: NewPayment, audit: AuditInfo) -> Result<Payment> {
        let sql = format!(
            "INSERT INTO loan_payments (loan_transaction_id, loan_billing_id, principal_amount, interest_amount, {}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            AUDIT_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![
            &payment.transaction_id,
            &payment.installment_id,
            &payment.principal_amount,
            &payment.interest_amount,
        ];
        args.extend(Self::audit_params(&audit));
        self.conn.execute(&sql, args.as_slice())?;

        let id = self.conn.last_insert_rowid();
        Ok(payment.into_payment(id, audit))
    }

    fn list_payments(&mut self, transaction_ids: &[TransactionId]) -> Result<Vec<Payment>> {
        if transaction_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {}, {} FROM loan_payments WHERE is_deleted = 0 AND loan_transaction_id IN ({}) \
             ORDER BY id ASC",
            PAYMENT_COLUMNS,
            AUDIT_COLUMNS,
            placeholders(transaction_ids.len())
        );
        self.select_many(&sql, params_from_iter(transaction_ids.iter()), payment_from_row)
    }
}

impl DelinquencyHistoryRepository for SqliteUnit<'_> {
    fn insert_delinquency_history(
        &mut self,
        transaction_id: TransactionId,
        bills: serde_json::Value,
        audit: AuditInfo,
    ) -> Result<DelinquencyHistory> {
        let sql = format!(
            "INSERT INTO loan_delinquent_histories (loan_transaction_id, bills, {}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            AUDIT_COLUMNS
        );
        let mut args: Vec<&dyn ToSql> = vec![&transaction_id, &bills];
        args.extend(Self::audit_params(&audit));
        self.conn.execute(&sql, args.as_slice())?;

        Ok(DelinquencyHistory {
            id: self.conn.last_insert_rowid(),
            transaction_id,
            bills,
            audit,
        })
    }

    fn list_delinquency_history(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<Vec<DelinquencyHistory>> {
        let sql = format!(
            "SELECT {}, {} FROM loan_delinquent_histories \
             WHERE loan_transaction_id = ?1 AND is_deleted = 0 ORDER BY id",
            HISTORY_COLUMNS, AUDIT_COLUMNS
        );
        self.select_many(&sql, params![transaction_id], history_from_row)
    }
}
