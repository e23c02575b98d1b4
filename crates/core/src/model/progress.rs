use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{AchievementId, LevelSlug, Preferences, QuestionRecord, User};
use crate::streak::{Streak, StreakTransition};

/// Hearts a learner starts with and is refilled to.
pub const MAX_HEARTS: u8 = 5;

//
// ─── PROGRESS STATE ────────────────────────────────────────────────────────────
//

/// Everything the app tracks about a learner.
///
/// Collections are kept free of duplicates by construction: every mutation
/// goes through a method here, and persisted data passes through
/// [`ProgressState::from_persisted`], which normalizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    user: Option<User>,
    hearts: u8,
    xp: u64,
    completed_levels: Vec<LevelSlug>,
    mistakes: Vec<QuestionRecord>,
    achievements: Vec<AchievementId>,
    streak: Streak,
    is_premium: bool,
    preferences: Preferences,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            user: None,
            hearts: MAX_HEARTS,
            xp: 0,
            completed_levels: Vec::new(),
            mistakes: Vec::new(),
            achievements: Vec::new(),
            streak: Streak::default(),
            is_premium: false,
            preferences: Preferences::default(),
        }
    }
}

/// Raw field values as read back from storage, before normalization.
#[derive(Debug, Clone, Default)]
pub struct PersistedProgress {
    pub user: Option<User>,
    pub hearts: Option<u64>,
    pub xp: Option<u64>,
    pub completed_levels: Vec<LevelSlug>,
    pub mistakes: Vec<QuestionRecord>,
    pub achievements: Vec<AchievementId>,
    pub streak_count: Option<u32>,
    pub last_active_date: Option<NaiveDate>,
    pub is_premium: Option<bool>,
    pub is_dark: Option<bool>,
    pub notifications: Option<bool>,
    pub sound_effects: Option<bool>,
}

impl ProgressState {
    /// Rebuild state from persisted values, filling gaps with defaults.
    ///
    /// Hearts are clamped to `MAX_HEARTS`; duplicate levels, achievements and
    /// mistakes keep their first occurrence.
    #[must_use]
    pub fn from_persisted(persisted: PersistedProgress) -> Self {
        let defaults = Self::default();
        let prefs = defaults.preferences;

        let hearts = persisted.hearts.map_or(MAX_HEARTS, |h| {
            u8::try_from(h).unwrap_or(MAX_HEARTS).min(MAX_HEARTS)
        });

        let mut state = Self {
            user: persisted.user,
            hearts,
            xp: persisted.xp.unwrap_or(0),
            completed_levels: Vec::with_capacity(persisted.completed_levels.len()),
            mistakes: Vec::with_capacity(persisted.mistakes.len()),
            achievements: Vec::with_capacity(persisted.achievements.len()),
            streak: Streak::new(
                persisted.streak_count.unwrap_or(0),
                persisted.last_active_date,
            ),
            is_premium: persisted.is_premium.unwrap_or(false),
            preferences: Preferences {
                is_dark: persisted.is_dark.unwrap_or(prefs.is_dark),
                notifications: persisted.notifications.unwrap_or(prefs.notifications),
                sound_effects: persisted.sound_effects.unwrap_or(prefs.sound_effects),
            },
        };

        for slug in persisted.completed_levels {
            state.complete_level(slug);
        }
        for question in persisted.mistakes {
            state.add_mistake(question);
        }
        for id in persisted.achievements {
            state.unlock_achievement(id);
        }
        state
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn hearts(&self) -> u8 {
        self.hearts
    }

    #[must_use]
    pub fn xp(&self) -> u64 {
        self.xp
    }

    #[must_use]
    pub fn completed_levels(&self) -> &[LevelSlug] {
        &self.completed_levels
    }

    #[must_use]
    pub fn mistakes(&self) -> &[QuestionRecord] {
        &self.mistakes
    }

    #[must_use]
    pub fn achievements(&self) -> &[AchievementId] {
        &self.achievements
    }

    #[must_use]
    pub fn streak(&self) -> Streak {
        self.streak
    }

    #[must_use]
    pub fn streak_count(&self) -> u32 {
        self.streak.count
    }

    #[must_use]
    pub fn last_active_date(&self) -> Option<NaiveDate> {
        self.streak.last_active
    }

    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.is_premium
    }

    #[must_use]
    pub fn preferences(&self) -> Preferences {
        self.preferences
    }

    pub fn preferences_mut(&mut self) -> &mut Preferences {
        &mut self.preferences
    }

    #[must_use]
    pub fn has_completed(&self, slug: &LevelSlug) -> bool {
        self.completed_levels.contains(slug)
    }

    #[must_use]
    pub fn has_achievement(&self, id: &AchievementId) -> bool {
        self.achievements.contains(id)
    }

    /// Returns true when no hearts are left and premium is off.
    #[must_use]
    pub fn is_out_of_hearts(&self) -> bool {
        self.hearts == 0 && !self.is_premium
    }

    // ─── Identity ──────────────────────────────────────────────────────────────

    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    /// Drop identity, progress, premium and preferences.
    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    // ─── Hearts ────────────────────────────────────────────────────────────────

    /// Spend one heart. Premium learners never lose hearts.
    ///
    /// Returns true if the heart count changed.
    pub fn deduct_heart(&mut self) -> bool {
        if self.is_premium || self.hearts == 0 {
            return false;
        }
        self.hearts -= 1;
        true
    }

    /// Returns true if the heart count changed.
    pub fn refill_hearts(&mut self) -> bool {
        let changed = self.hearts != MAX_HEARTS;
        self.hearts = MAX_HEARTS;
        changed
    }

    pub fn toggle_premium(&mut self) -> bool {
        self.is_premium = !self.is_premium;
        self.is_premium
    }

    // ─── XP ────────────────────────────────────────────────────────────────────

    /// Returns true if XP changed.
    pub fn add_xp(&mut self, amount: u64) -> bool {
        let before = self.xp;
        self.xp = self.xp.saturating_add(amount);
        self.xp != before
    }

    // ─── Levels, mistakes, achievements ────────────────────────────────────────

    /// Returns true if the level was not completed before.
    pub fn complete_level(&mut self, slug: impl Into<LevelSlug>) -> bool {
        let slug = slug.into();
        if self.completed_levels.contains(&slug) {
            return false;
        }
        self.completed_levels.push(slug);
        true
    }

    /// Append a missed question unless one with the same text is present.
    pub fn add_mistake(&mut self, question: QuestionRecord) -> bool {
        if self.mistakes.iter().any(|m| m.is_question(&question.q)) {
            return false;
        }
        self.mistakes.push(question);
        true
    }

    /// Remove every record with the given question text.
    pub fn remove_mistake(&mut self, q: &str) -> bool {
        let before = self.mistakes.len();
        self.mistakes.retain(|m| !m.is_question(q));
        self.mistakes.len() != before
    }

    pub fn unlock_achievement(&mut self, id: impl Into<AchievementId>) -> bool {
        let id = id.into();
        if self.achievements.contains(&id) {
            return false;
        }
        self.achievements.push(id);
        true
    }

    // ─── Streak ────────────────────────────────────────────────────────────────

    pub fn update_streak(&mut self, today: NaiveDate) -> StreakTransition {
        self.streak.record_activity(today)
    }

    /// Reset learning progress, keeping identity, premium and preferences.
    pub fn reset_progress(&mut self) {
        self.hearts = MAX_HEARTS;
        self.xp = 0;
        self.completed_levels.clear();
        self.mistakes.clear();
        self.achievements.clear();
        self.streak = Streak::default();
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
