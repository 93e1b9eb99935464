//! Planned versus actual effort.

use chrono::NaiveDate;
use serde::Serialize;

use crate::schedule::Schedule;
use crate::types::{Effort, EstimateId};

/// Planned and actual effort of one estimate up to a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EstimateVariance {
    pub estimate_id: EstimateId,
    pub title: String,
    pub total: Effort,
    /// Allocation on or before the cut-off date.
    pub planned_to_date: Effort,
    /// Actuals on or before the cut-off date.
    pub actual_to_date: Effort,
    /// All recorded actuals, including ones after the cut-off.
    pub actual_total: Effort,
    /// `actual_to_date - planned_to_date` in minutes; positive is an overrun.
    pub variance_minutes: i64,
}

impl EstimateVariance {
    pub const fn is_overrun(&self) -> bool {
        self.variance_minutes > 0
    }
}

/// Variance of every estimate through `through`, in priority order.
pub fn variance_report(schedule: &Schedule, through: NaiveDate) -> Vec<EstimateVariance> {
    schedule
        .estimates()
        .iter()
        .map(|estimate| {
            let planned_to_date: Effort = schedule
                .entries_of(&estimate.id)
                .filter(|entry| entry.date <= through)
                .map(|entry| entry.amount)
                .sum();
            let (actual_to_date, actual_total) = schedule
                .actuals()
                .filter(|actual| actual.estimate_id == estimate.id)
                .fold((Effort::ZERO, Effort::ZERO), |(to_date, total), actual| {
                    if actual.date <= through {
                        (to_date + actual.amount, total + actual.amount)
                    } else {
                        (to_date, total + actual.amount)
                    }
                });
            EstimateVariance {
                estimate_id: estimate.id.clone(),
                title: estimate.title.clone(),
                total: estimate.total,
                planned_to_date,
                actual_to_date,
                actual_total,
                variance_minutes: actual_to_date.as_minutes() - planned_to_date.as_minutes(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actual::record_actual;
    use crate::estimate::add_estimate;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 5 + d).unwrap()
    }

    #[test]
    fn reports_overrun_and_underrun() {
        let now = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let mut schedule = Schedule::default();
        let design = add_estimate(&mut schedule, "Design doc", Effort::from_hours(10), day(1), now)
            .unwrap();
        let review = add_estimate(&mut schedule, "Review", Effort::from_hours(4), day(1), now)
            .unwrap();
        record_actual(&mut schedule, &design, day(1), Effort::from_hours(9), false, now).unwrap();
        record_actual(&mut schedule, &design, day(3), Effort::from_hours(1), false, now).unwrap();
        record_actual(&mut schedule, &review, day(2), Effort::from_hours(1), false, now).unwrap();

        let report = variance_report(&schedule, day(2));

        // Design: 8h day 1 + 2h day 2 planned; Review: 4h on day 2.
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].estimate_id, design);
        assert_eq!(report[0].planned_to_date, Effort::from_hours(10));
        assert_eq!(report[0].actual_to_date, Effort::from_hours(9));
        assert_eq!(report[0].actual_total, Effort::from_hours(10));
        assert_eq!(report[0].variance_minutes, -60);
        assert!(!report[0].is_overrun());

        assert_eq!(report[1].planned_to_date, Effort::from_hours(4));
        assert_eq!(report[1].variance_minutes, -180);

        let early = variance_report(&schedule, day(1));
        assert_eq!(early[0].planned_to_date, Effort::from_hours(8));
        assert_eq!(early[0].variance_minutes, 60);
        assert!(early[0].is_overrun());
        assert_eq!(early[1].planned_to_date, Effort::ZERO);
    }
}
