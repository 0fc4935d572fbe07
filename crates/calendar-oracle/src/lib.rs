//! Trading-day calendar (C13): weekend + a data-driven US-market holiday set,
//! plus the backward walk `ContinuityEngine` (C7) uses to find the prior live
//! scan day across weekends and holidays.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};
use signal_core::TradingCalendar;

/// NYSE/Nasdaq full-day market holidays, 2024-2026. Hard-coded per the spec's
/// open question: renewal for future years is a separate operator responsibility.
fn us_market_holidays() -> HashSet<NaiveDate> {
    const DATES: &[(i32, u32, u32)] = &[
        // 2024
        (2024, 1, 1),
        (2024, 1, 15),
        (2024, 2, 19),
        (2024, 3, 29),
        (2024, 5, 27),
        (2024, 6, 19),
        (2024, 7, 4),
        (2024, 9, 2),
        (2024, 11, 28),
        (2024, 12, 25),
        // 2025
        (2025, 1, 1),
        (2025, 1, 20),
        (2025, 2, 17),
        (2025, 4, 18),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 11, 27),
        (2025, 12, 25),
        // 2026
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 4, 3),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3),
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
    ];
    DATES
        .iter()
        .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .collect()
}

/// `TradingCalendar` implementation backed by the hard-coded holiday set above.
pub struct CalendarOracle {
    holidays: HashSet<NaiveDate>,
}

impl Default for CalendarOracle {
    fn default() -> Self {
        Self { holidays: us_market_holidays() }
    }
}

impl CalendarOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a calendar from a caller-supplied holiday set, for tests or markets
    /// outside the hard-coded US set.
    pub fn with_holidays(holidays: HashSet<NaiveDate>) -> Self {
        Self { holidays }
    }
}

impl TradingCalendar for CalendarOracle {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Walks backward from `date` (exclusive) up to `max_lookback` days, returning
    /// the first day that is a trading day. `None` if none is found in range.
    fn previous_trading_day(&self, date: NaiveDate, max_lookback: u32) -> Option<NaiveDate> {
        let mut candidate = date;
        for _ in 0..max_lookback {
            candidate = candidate.pred_opt()?;
            if self.is_trading_day(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
