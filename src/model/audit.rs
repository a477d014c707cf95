use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::CallContext;

/// audit and soft-delete columns shared by every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub is_deleted: bool,
}

impl AuditInfo {
    /// stamp a record created within `ctx`
    pub fn created(ctx: &CallContext<'_>) -> Self {
        Self::created_at(ctx.now(), &ctx.actor)
    }

    pub fn created_at(at: DateTime<Utc>, by: &str) -> Self {
        Self {
            created_at: at,
            created_by: by.to_string(),
            updated_at: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            is_deleted: false,
        }
    }

    /// stamp an update made within `ctx`
    pub fn touch(&mut self, ctx: &CallContext<'_>) {
        self.updated_at = Some(ctx.now());
        self.updated_by = Some(ctx.actor.clone());
    }
}

/// records that carry audit columns
pub trait Audited {
    fn audit(&self) -> &AuditInfo;

    /// soft-deleted records are invisible to every read
    fn is_deleted(&self) -> bool {
        self.audit().is_deleted
    }
}

macro_rules! impl_audited {
    ($($record:ty),+ $(,)?) => {
        $(
            impl $crate::model::audit::Audited for $record {
                fn audit(&self) -> &$crate::model::audit::AuditInfo {
                    &self.audit
                }
            }
        )+
    };
}

pub(crate) use impl_audited;
