use serde::{Deserialize, Serialize};

use crate::types::SettingId;

use super::audit::{impl_audited, AuditInfo};

/// named string setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub id: SettingId,
    pub name: String,
    pub value: String,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl_audited!(Setting);

