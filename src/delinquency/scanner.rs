use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::model::Installment;
use crate::types::{BorrowerId, InstallmentId, TransactionId};

/// borrower whose overdue installments reached the limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub borrower_id: BorrowerId,
    /// overdue installments that triggered it, per transaction
    pub by_transaction: BTreeMap<TransactionId, Vec<Installment>>,
}

impl Escalation {
    pub fn overdue_count(&self) -> usize {
        self.by_transaction.values().map(Vec::len).sum()
    }
}

/// writes one scan run has to commit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanPlan {
    /// every candidate, escalated or not, gets flagged so it is never recounted
    pub to_check: Vec<InstallmentId>,
    pub escalations: Vec<Escalation>,
}

impl ScanPlan {
    pub fn is_empty(&self) -> bool {
        self.to_check.is_empty()
    }

    pub fn escalated_borrowers(&self) -> Vec<BorrowerId> {
        self.escalations.iter().map(|e| e.borrower_id).collect()
    }
}

/// level change applied to one borrower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    pub borrower_id: BorrowerId,
    pub from: u32,
    pub to: u32,
}

/// outcome of a committed scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub run_id: Uuid,
    pub as_of: NaiveDate,
    pub limit: usize,
    pub checked: usize,
    pub escalated: Vec<LevelChange>,
}

impl ScanReport {
    pub fn escalated_count(&self) -> usize {
        self.escalated.len()
    }
}

/// groups overdue installments by borrower and picks who to escalate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelinquencyScanner {
    limit: usize,
}

impl DelinquencyScanner {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// `candidates` are overdue, untouched and not yet checked
    pub fn plan(&self, candidates: &[Installment]) -> ScanPlan {
        let mut by_borrower: BTreeMap<BorrowerId, Vec<&Installment>> = BTreeMap::new();
        for inst in candidates {
            by_borrower.entry(inst.borrower_id).or_default().push(inst);
        }

        let escalations = by_borrower
            .into_iter()
            .filter(|(_, overdue)| overdue.len() >= self.limit)
            .map(|(borrower_id, overdue)| {
                let mut by_transaction: BTreeMap<TransactionId, Vec<Installment>> = BTreeMap::new();
                for inst in overdue {
                    by_transaction
                        .entry(inst.transaction_id)
                        .or_default()
                        .push(inst.clone());
                }
                Escalation {
                    borrower_id,
                    by_transaction,
                }
            })
            .collect();

        ScanPlan {
            to_check: candidates.iter().map(|i| i.id).collect(),
            escalations,
        }
    }
}
