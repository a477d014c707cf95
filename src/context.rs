use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::errors::{BillingError, Result};

/// shared cancellation switch, cloned into every call that should observe it
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// per-call context: acting user, audit clock, cancellation and deadline
pub struct CallContext<'a> {
    pub request_id: Uuid,
    pub actor: String,
    time: &'a SafeTimeProvider,
    cancel: CancelFlag,
    deadline: Option<Instant>,
}

impl<'a> CallContext<'a> {
    pub fn new(actor: impl Into<String>, time: &'a SafeTimeProvider) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor: actor.into(),
            time,
            cancel: CancelFlag::new(),
            deadline: None,
        }
    }

    /// context for jobs that run without an acting user
    pub fn system(time: &'a SafeTimeProvider) -> Self {
        Self::new("system", time)
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// timestamp for audit columns
    pub fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    /// fail fast once the caller gave up on this call
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BillingError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BillingError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}
