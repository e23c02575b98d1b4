use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage format for the last active day.
pub const ACTIVE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Day format written by earlier app builds (`Sat Oct 18 2026`).
const LEGACY_ACTIVE_DATE_FORMAT: &str = "%a %b %d %Y";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreakError {
    #[error("invalid active date: {raw:?}")]
    InvalidDate { raw: String },
}

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// What a check-in did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// Activity was already counted today.
    AlreadyCounted,
    /// Last activity was yesterday; the streak grew by one.
    Continued,
    /// No prior activity, or the streak was broken; it starts over at one.
    Restarted,
}

impl StreakTransition {
    /// Returns true if the check-in modified the streak.
    #[must_use]
    pub fn changed(self) -> bool {
        !matches!(self, StreakTransition::AlreadyCounted)
    }
}

//
// ─── STREAK ────────────────────────────────────────────────────────────────────
//

/// Consecutive-day activity counter.
///
/// # Examples
///
/// ```
/// # use duo_core::streak::{Streak, StreakTransition};
/// # use chrono::NaiveDate;
/// let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
/// let mut streak = Streak::new(4, today.pred_opt());
///
/// assert_eq!(streak.record_activity(today), StreakTransition::Continued);
/// assert_eq!(streak.count, 5);
/// assert_eq!(streak.record_activity(today), StreakTransition::AlreadyCounted);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Streak {
    pub count: u32,
    pub last_active: Option<NaiveDate>,
}

impl Streak {
    #[must_use]
    pub fn new(count: u32, last_active: Option<NaiveDate>) -> Self {
        Self { count, last_active }
    }

    /// Classify a check-in on `today` without applying it.
    #[must_use]
    pub fn classify(&self, today: NaiveDate) -> StreakTransition {
        match self.last_active {
            Some(last) if last == today => StreakTransition::AlreadyCounted,
            Some(last) if today.pred_opt() == Some(last) => StreakTransition::Continued,
            _ => StreakTransition::Restarted,
        }
    }

    /// Record activity on `today` and return the transition taken.
    ///
    /// Idempotent per calendar day: only the first call on a given day has an
    /// effect. A last-active day in the future counts as a broken streak.
    pub fn record_activity(&mut self, today: NaiveDate) -> StreakTransition {
        let transition = self.classify(today);
        match transition {
            StreakTransition::AlreadyCounted => {}
            StreakTransition::Continued => {
                self.count = self.count.saturating_add(1);
                self.last_active = Some(today);
            }
            StreakTransition::Restarted => {
                self.count = 1;
                self.last_active = Some(today);
            }
        }
        transition
    }

    /// Returns true if a check-in on `today` would keep the streak going.
    #[must_use]
    pub fn is_alive(&self, today: NaiveDate) -> bool {
        !matches!(self.classify(today), StreakTransition::Restarted)
    }
}

//
// ─── DATE ENCODING ─────────────────────────────────────────────────────────────
//

#[must_use]
pub fn format_active_date(day: NaiveDate) -> String {
    day.format(ACTIVE_DATE_FORMAT).to_string()
}

/// Parse a stored last-active day, accepting the legacy long form as well.
///
/// # Errors
///
/// Returns `StreakError::InvalidDate` if neither format matches.
pub fn parse_active_date(raw: &str) -> Result<NaiveDate, StreakError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, ACTIVE_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, LEGACY_ACTIVE_DATE_FORMAT))
        .map_err(|_| StreakError::InvalidDate {
            raw: raw.to_string(),
        })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
