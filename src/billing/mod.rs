pub mod outstanding;
pub mod schedule;

pub use outstanding::{Outstanding, OutstandingCalculator};
pub use schedule::{BillingSchedule, ScheduleGenerator, ScheduledInstallment};
