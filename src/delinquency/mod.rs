pub mod scanner;
pub mod scheduler;

pub use scanner::{DelinquencyScanner, Escalation, LevelChange, ScanPlan, ScanReport};
pub use scheduler::{DelinquencyScheduler, RunGuard, SingleRun};
