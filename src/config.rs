use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{BillingError, Result};

/// setting holding the simulated current date (`YYYY-MM-DD`)
pub const EOD_DATE_SETTING: &str = "eod_date";
/// setting holding the number of overdue unchecked installments that escalates a borrower
pub const DELINQUENCY_LIMIT_SETTING: &str = "limit_billing_for_delinquent";

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// decimal places of the currency's smallest unit used when splitting principal
    pub minor_unit_dp: u32,
    /// maximum installments loaded per outstanding calculation
    pub installment_page_size: usize,
    /// delinquency scan cadence
    pub scan_interval_secs: u64,
    /// sqlite file, `None` keeps the database in memory
    pub database_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minor_unit_dp: 0,
            installment_page_size: 1_000,
            scan_interval_secs: 24 * 60 * 60,
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// currencies without a usable minor unit (e.g. rupiah)
    pub fn whole_units() -> Self {
        Self::default()
    }

    /// currencies with cents
    pub fn cents() -> Self {
        Self {
            minor_unit_dp: 2,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.minor_unit_dp > 8 {
            return Err(BillingError::validation(
                "minor_unit_dp",
                format!("{} exceeds 8 decimal places", self.minor_unit_dp),
            ));
        }
        if self.installment_page_size == 0 {
            return Err(BillingError::validation(
                "installment_page_size",
                "must be at least 1",
            ));
        }
        if self.scan_interval_secs == 0 {
            return Err(BillingError::validation("scan_interval_secs", "must be at least 1"));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

/// parse the `eod_date` setting value
pub fn parse_eod_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| BillingError::InvalidEodDate {
        value: value.to_string(),
    })
}

/// parse the `limit_billing_for_delinquent` setting value
pub fn parse_delinquency_limit(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| BillingError::InvalidDelinquencyLimit {
            value: value.to_string(),
        })
}
