pub mod audit;
pub mod borrower;
pub mod installment;
pub mod product;
pub mod setting;
pub mod transaction;

pub use audit::{AuditInfo, Audited};
pub use borrower::{Borrower, NewBorrower};
pub use installment::{Installment, InstallmentFilter, NewInstallment};
pub use product::{LoanProduct, NewLoanProduct};
pub use setting::Setting;
pub use transaction::{
    invoice_number, DelinquencyHistory, LoanTransaction, NewPayment, NewTransaction, Payment,
    TransactionWithPayments,
};
