//! Budget cycle windows.
//!
//! A budget counts the expenses dated in `[start, cycle_end)`. The window
//! never rolls over: `start` is fixed when the budget is created or edited.

use api_types::budget::BudgetCycle;
use chrono::{DateTime, Duration, Months, Utc};

/// Exclusive end of the cycle window that begins at `start`.
///
/// Month and year steps clamp to the last valid day (Jan 31 + 1 month is
/// Feb 29 in a leap year). A custom cycle ends at `end`, or one month after
/// `start` when no end is set.
pub fn cycle_end(
    cycle: BudgetCycle,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match cycle {
        BudgetCycle::Daily => start + Duration::days(1),
        BudgetCycle::Weekly => start + Duration::weeks(1),
        BudgetCycle::Monthly => add_months(start, 1),
        BudgetCycle::Yearly => add_months(start, 12),
        BudgetCycle::Custom => end.unwrap_or_else(|| add_months(start, 1)),
    }
}

/// Whether `date` falls in `[start, cycle_end)`.
pub fn is_in_cycle(
    date: DateTime<Utc>,
    cycle: BudgetCycle,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> bool {
    date >= start && date < cycle_end(cycle, start, end)
}

fn add_months(start: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn end_per_cycle() {
        let start = at(2024, 1, 31);
        assert_eq!(cycle_end(BudgetCycle::Daily, start, None), at(2024, 2, 1));
        assert_eq!(cycle_end(BudgetCycle::Weekly, start, None), at(2024, 2, 7));
        assert_eq!(cycle_end(BudgetCycle::Monthly, start, None), at(2024, 2, 29));
        assert_eq!(cycle_end(BudgetCycle::Yearly, at(2024, 2, 29), None), at(2025, 2, 28));
        assert_eq!(cycle_end(BudgetCycle::Custom, start, None), at(2024, 2, 29));
        assert_eq!(
            cycle_end(BudgetCycle::Custom, start, Some(at(2024, 3, 15))),
            at(2024, 3, 15)
        );
    }

    #[test]
    fn start_inclusive_end_exclusive() {
        let start = at(2024, 1, 1);
        for cycle in [
            BudgetCycle::Daily,
            BudgetCycle::Weekly,
            BudgetCycle::Monthly,
            BudgetCycle::Yearly,
            BudgetCycle::Custom,
        ] {
            let end = cycle_end(cycle, start, None);
            assert!(is_in_cycle(start, cycle, start, None), "{cycle:?} start");
            assert!(
                is_in_cycle(end - Duration::seconds(1), cycle, start, None),
                "{cycle:?} last second"
            );
            assert!(!is_in_cycle(end, cycle, start, None), "{cycle:?} end");
            assert!(
                !is_in_cycle(start - Duration::seconds(1), cycle, start, None),
                "{cycle:?} before start"
            );
        }
    }

    #[test]
    fn monthly_budget_window() {
        let start = at(2024, 1, 1);
        assert!(is_in_cycle(at(2024, 1, 15), BudgetCycle::Monthly, start, None));
        assert!(!is_in_cycle(at(2024, 2, 2), BudgetCycle::Monthly, start, None));
    }
}
