//! Built-in achievement badges and the milestones that unlock them.

use crate::model::{AchievementId, ProgressState};

/// XP needed for the `novice_coder` badge.
pub const NOVICE_CODER_XP: u64 = 100;

/// Streak length needed for the `streak_3` badge.
pub const ON_FIRE_STREAK: u32 = 3;

/// Milestone a badge is tied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    /// At least this many levels completed.
    LevelsCompleted(usize),
    /// XP at or above the threshold.
    XpReached(u64),
    /// Streak at or above the given number of days.
    StreakDays(u32),
}

impl Milestone {
    #[must_use]
    pub fn is_met(self, state: &ProgressState) -> bool {
        match self {
            Milestone::LevelsCompleted(n) => state.completed_levels().len() >= n,
            Milestone::XpReached(xp) => state.xp() >= xp,
            Milestone::StreakDays(days) => state.streak_count() >= days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub milestone: Milestone,
}

impl Badge {
    #[must_use]
    pub fn achievement_id(&self) -> AchievementId {
        AchievementId::new(self.id)
    }
}

pub const CATALOG: [Badge; 3] = [
    Badge {
        id: "first_win",
        title: "First Steps",
        description: "Complete your first quiz",
        milestone: Milestone::LevelsCompleted(1),
    },
    Badge {
        id: "novice_coder",
        title: "Novice Coder",
        description: "Earn 100 XP",
        milestone: Milestone::XpReached(NOVICE_CODER_XP),
    },
    Badge {
        id: "streak_3",
        title: "On Fire",
        description: "Reach a 3-day streak",
        milestone: Milestone::StreakDays(ON_FIRE_STREAK),
    },
];

/// Look up a badge by id.
#[must_use]
pub fn badge(id: &str) -> Option<&'static Badge> {
    CATALOG.iter().find(|b| b.id == id)
}

/// Badges whose milestone the state currently meets.
pub fn earned(state: &ProgressState) -> impl Iterator<Item = &'static Badge> + '_ {
    CATALOG.iter().filter(move |b| b.milestone.is_met(state))
}

/// Earned badges that are not unlocked yet.
#[must_use]
pub fn newly_earned(state: &ProgressState) -> Vec<AchievementId> {
    earned(state)
        .map(Badge::achievement_id)
        .filter(|id| !state.has_achievement(id))
        .collect()
}
