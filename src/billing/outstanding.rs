use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::model::Installment;

/// balances of a borrower's installments as of one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outstanding {
    pub as_of: NaiveDate,
    /// earliest due date among the current installments
    pub current_due_date: Option<NaiveDate>,
    /// first unpaid due date after `as_of`
    pub next_due_date: Option<NaiveDate>,
    pub billed_principal: Money,
    pub billed_interest: Money,
    pub total_billed: Money,
    pub total_paid: Money,
    pub os_principal: Money,
    pub os_interest: Money,
    pub total_outstanding: Money,
    pub current_installments: Vec<Installment>,
}

impl Outstanding {
    pub fn empty(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            current_due_date: None,
            next_due_date: None,
            billed_principal: Money::ZERO,
            billed_interest: Money::ZERO,
            total_billed: Money::ZERO,
            total_paid: Money::ZERO,
            os_principal: Money::ZERO,
            os_interest: Money::ZERO,
            total_outstanding: Money::ZERO,
            current_installments: Vec::new(),
        }
    }

    /// amount the borrower has to pay right now
    pub fn amount_payable(&self) -> Money {
        self.total_billed - self.total_paid
    }

    pub fn is_fully_paid(&self) -> bool {
        self.total_outstanding.is_zero()
    }
}

/// outstanding balance aggregator
pub struct OutstandingCalculator;

impl OutstandingCalculator {
    /// Aggregate `installments` as of `as_of`.
    ///
    /// An installment is current when it is due on or before `as_of` and not
    /// settled; only current installments count towards the billed and paid
    /// totals. Outstanding totals cover every installment regardless of date.
    pub fn calculate(installments: &[Installment], as_of: NaiveDate) -> Outstanding {
        let mut ordered: Vec<&Installment> = installments.iter().collect();
        ordered.sort_by_key(|i| (i.due_date, i.id));

        let mut out = Outstanding::empty(as_of);

        for inst in ordered {
            if !inst.is_settled() {
                if inst.is_due_on_or_before(as_of) {
                    out.billed_principal += inst.principal_due;
                    out.billed_interest += inst.interest_due;
                    out.total_paid += inst.total_paid();
                    if out.current_due_date.is_none() {
                        out.current_due_date = Some(inst.due_date);
                    }
                    out.current_installments.push(inst.clone());
                } else if out.next_due_date.is_none() {
                    out.next_due_date = Some(inst.due_date);
                }
            }

            out.os_principal += inst.outstanding_principal();
            out.os_interest += inst.outstanding_interest();
        }

        out.total_billed = out.billed_principal + out.billed_interest;
        out.total_outstanding = out.os_principal + out.os_interest;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditInfo, NewInstallment};
    use chrono::{Duration, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// four weekly installments of 250 + 25 starting 2024-01-08
    fn installments() -> Vec<Installment> {
        (0..4)
            .map(|k| {
                NewInstallment {
                    transaction_id: 1,
                    borrower_id: 9,
                    due_date: date(2024, 1, 8) + Duration::days(7 * k),
                    principal_due: Money::from_major(250),
                    interest_due: Money::from_major(25),
                }
                .into_installment(k + 1, AuditInfo::created_at(Utc::now(), "system"))
            })
            .collect()
    }

    #[test]
    fn test_nothing_due_yet() {
        let out = OutstandingCalculator::calculate(&installments(), date(2024, 1, 1));

        assert_eq!(out.current_due_date, None);
        assert_eq!(out.next_due_date, Some(date(2024, 1, 8)));
        assert_eq!(out.total_billed, Money::ZERO);
        assert_eq!(out.os_principal, Money::from_major(1000));
        assert_eq!(out.os_interest, Money::from_major(100));
        assert_eq!(out.total_outstanding, Money::from_major(1100));
        assert!(out.current_installments.is_empty());
    }

    #[test]
    fn test_due_date_boundary_is_inclusive() {
        let out = OutstandingCalculator::calculate(&installments(), date(2024, 1, 15));

        assert_eq!(out.current_due_date, Some(date(2024, 1, 8)));
        assert_eq!(out.next_due_date, Some(date(2024, 1, 22)));
        assert_eq!(out.current_installments.len(), 2);
        assert_eq!(out.billed_principal, Money::from_major(500));
        assert_eq!(out.billed_interest, Money::from_major(50));
        assert_eq!(out.total_billed, Money::from_major(550));
        assert_eq!(out.amount_payable(), Money::from_major(550));
    }

    #[test]
    fn test_settled_installments_leave_billed_totals() {
        let mut rows = installments();
        rows[0].principal_paid = rows[0].principal_due;
        rows[0].interest_paid = rows[0].interest_due;

        let out = OutstandingCalculator::calculate(&rows, date(2024, 1, 15));

        assert_eq!(out.current_due_date, Some(date(2024, 1, 15)));
        assert_eq!(out.current_installments.len(), 1);
        assert_eq!(out.total_billed, Money::from_major(275));
        assert_eq!(out.total_paid, Money::ZERO);
        assert_eq!(out.total_outstanding, Money::from_major(825));
    }

    #[test]
    fn test_next_due_date_is_the_first_future_one() {
        // input order must not matter
        let mut rows = installments();
        rows.reverse();

        let out = OutstandingCalculator::calculate(&rows, date(2024, 1, 9));
        assert_eq!(out.next_due_date, Some(date(2024, 1, 15)));
        assert_eq!(out.current_due_date, Some(date(2024, 1, 8)));
    }

    #[test]
    fn test_everything_paid() {
        let mut rows = installments();
        for inst in rows.iter_mut() {
            inst.principal_paid = inst.principal_due;
            inst.interest_paid = inst.interest_due;
        }

        let out = OutstandingCalculator::calculate(&rows, date(2024, 3, 1));
        assert!(out.is_fully_paid());
        assert_eq!(out.current_due_date, None);
        assert_eq!(out.next_due_date, None);
        assert_eq!(out.total_billed, Money::ZERO);
    }

    #[test]
    fn test_calculation_is_repeatable() {
        let rows = installments();
        let first = OutstandingCalculator::calculate(&rows, date(2024, 1, 22));
        let second = OutstandingCalculator::calculate(&rows, date(2024, 1, 22));
        assert_eq!(first, second);
    }
}
