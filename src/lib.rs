pub mod billing;
pub mod config;
pub mod context;
pub mod decimal;
pub mod delinquency;
pub mod engine;
pub mod errors;
pub mod model;
pub mod payments;
pub mod store;
pub mod types;

// re-export key types
pub use billing::{BillingSchedule, Outstanding, OutstandingCalculator, ScheduleGenerator, ScheduledInstallment};
pub use config::{EngineConfig, DELINQUENCY_LIMIT_SETTING, EOD_DATE_SETTING};
pub use context::{CallContext, CancelFlag};
pub use decimal::{Money, Rate};
pub use delinquency::{DelinquencyScanner, DelinquencyScheduler, LevelChange, ScanPlan, ScanReport};
pub use engine::{BillingEngine, CreateTransactionRequest, CreatedTransaction};
pub use errors::{BillingError, ErrorKind, Result};
pub use model::{
    AuditInfo, Audited, Borrower, DelinquencyHistory, Installment, LoanProduct, LoanTransaction,
    NewBorrower, NewLoanProduct, Payment, Setting, TransactionWithPayments,
};
pub use payments::{Allocation, PayRequest, PaymentAllocator, PaymentReceipt};
pub use store::{MemoryStore, SqliteStore, Store, UnitOfWork};
pub use types::{
    BorrowerId, InstallmentId, LoanProductId, PaymentId, RepaymentUnit, TransactionId,
    TransactionStatus,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
