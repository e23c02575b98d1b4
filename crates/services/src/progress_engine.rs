use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use duo_core::achievements;
use duo_core::model::{AchievementId, AuthToken, LevelSlug, ProgressState, QuestionRecord, User};
use duo_core::time::Clock;
use storage::repository::KeyValueStore;

use crate::config::EngineConfig;
use crate::persistence::WriteBehind;
use crate::progress_codec::{encode_progress, load_progress};
use crate::sync::{ProgressSync, SyncDispatcher, SyncEvent};

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Read-only view of the engine's state for screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub user: Option<User>,
    pub hearts: u8,
    pub xp: u64,
    pub completed_levels: Vec<LevelSlug>,
    pub mistakes: Vec<QuestionRecord>,
    pub achievements: Vec<AchievementId>,
    pub is_loaded: bool,
    pub is_dark: bool,
    pub notifications: bool,
    pub sound_effects: bool,
    pub is_premium: bool,
    pub streak_count: u32,
    pub last_active_date: Option<NaiveDate>,
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Owns the learner's progress and keeps storage in step with it.
///
/// Every mutation updates memory immediately and queues a full-state write
/// on a background task. Writes are held back until [`initialize`] has read
/// storage, so defaults never overwrite saved progress.
///
/// [`initialize`]: ProgressEngine::initialize
pub struct ProgressEngine {
    clock: Clock,
    store: Arc<dyn KeyValueStore>,
    config: EngineConfig,
    sync: Option<Arc<dyn ProgressSync>>,
    state: ProgressState,
    token: Option<AuthToken>,
    is_loaded: bool,
    writer: Option<WriteBehind>,
    dispatcher: Option<SyncDispatcher>,
}

impl ProgressEngine {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Clock) -> Self {
        Self {
            clock,
            store,
            config: EngineConfig::default(),
            sync: None,
            state: ProgressState::default(),
            token: None,
            is_loaded: false,
            writer: None,
            dispatcher: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_sync(mut self, sync: Arc<dyn ProgressSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Load persisted progress and start the background workers.
    ///
    /// Missing or unreadable fields fall back to defaults; this never fails.
    /// Anything mutated before this call is replaced by the loaded state.
    /// Calling it again only returns the current snapshot.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn initialize(&mut self) -> ProgressSnapshot {
        if self.is_loaded {
            return self.snapshot();
        }

        let loaded = load_progress(self.store.as_ref()).await;
        self.state = loaded.state;
        self.token = loaded.token;
        self.writer = Some(WriteBehind::spawn(
            Arc::clone(&self.store),
            self.config.clone(),
        ));
        self.dispatcher = self.sync.as_ref().map(|s| SyncDispatcher::spawn(Arc::clone(s)));
        self.is_loaded = true;

        info!(
            hearts = self.state.hearts(),
            xp = self.state.xp(),
            streak = self.state.streak_count(),
            signed_in = self.state.user().is_some(),
            "progress loaded"
        );
        self.snapshot()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    #[must_use]
    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let prefs = self.state.preferences();
        ProgressSnapshot {
            user: self.state.user().cloned(),
            hearts: self.state.hearts(),
            xp: self.state.xp(),
            completed_levels: self.state.completed_levels().to_vec(),
            mistakes: self.state.mistakes().to_vec(),
            achievements: self.state.achievements().to_vec(),
            is_loaded: self.is_loaded,
            is_dark: prefs.is_dark,
            notifications: prefs.notifications,
            sound_effects: prefs.sound_effects,
            is_premium: self.state.is_premium(),
            streak_count: self.state.streak_count(),
            last_active_date: self.state.last_active_date(),
        }
    }

    /// True once loaded with no hearts left and no premium.
    ///
    /// Always false before load, so the default state never triggers a lockout.
    #[must_use]
    pub fn is_locked_out(&self) -> bool {
        self.is_loaded && self.state.is_out_of_hearts()
    }

    // ─── Identity ──────────────────────────────────────────────────────────────

    /// Store the signed-in identity. Without a token, any stored token is dropped.
    pub fn sign_in(&mut self, user: User, token: Option<AuthToken>) {
        info!(user_id = %user.id, "signed in");
        self.state.set_user(Some(user));
        self.token = token;
        self.persist();
    }

    /// Forget identity, progress and preferences, and wipe storage.
    pub fn sign_out(&mut self) {
        self.state.clear_all();
        self.token = None;
        if !self.is_loaded {
            debug!("sign-out before load, storage left untouched");
            return;
        }
        if let Some(writer) = &self.writer {
            writer.clear();
        }
        info!("signed out, progress cleared");
    }

    // ─── Hearts ────────────────────────────────────────────────────────────────

    /// Spend a heart unless premium or already empty.
    pub fn deduct_heart(&mut self) -> bool {
        let changed = self.state.deduct_heart();
        if changed {
            self.persist();
            self.emit(SyncEvent::HeartDeducted);
            if self.is_locked_out() {
                info!("out of hearts");
            }
        }
        changed
    }

    pub fn refill_hearts(&mut self) {
        if self.state.refill_hearts() {
            self.persist();
        }
    }

    pub fn toggle_premium(&mut self) -> bool {
        let premium = self.state.toggle_premium();
        self.persist();
        premium
    }

    // ─── XP & levels ───────────────────────────────────────────────────────────

    /// Add XP, saturating at `u64::MAX`. The backend receives the amount
    /// actually gained.
    pub fn add_xp(&mut self, amount: u64) {
        let before = self.state.xp();
        if self.state.add_xp(amount) {
            self.persist();
            self.emit(SyncEvent::XpAwarded {
                amount: self.state.xp() - before,
            });
        }
    }

    pub fn complete_level(&mut self, slug: impl Into<LevelSlug>) -> bool {
        let slug = slug.into();
        let added = self.state.complete_level(slug.clone());
        if added {
            self.persist();
            self.emit(SyncEvent::LevelCompleted { slug });
        }
        added
    }

    // ─── Mistakes & achievements ───────────────────────────────────────────────

    pub fn add_mistake(&mut self, question: QuestionRecord) -> bool {
        let added = self.state.add_mistake(question);
        if added {
            self.persist();
        }
        added
    }

    pub fn remove_mistake(&mut self, q: &str) -> bool {
        let removed = self.state.remove_mistake(q);
        if removed {
            self.persist();
        }
        removed
    }

    pub fn unlock_achievement(&mut self, id: impl Into<AchievementId>) -> bool {
        let added = self.state.unlock_achievement(id);
        if added {
            self.persist();
        }
        added
    }

    /// Unlock every catalog badge the current state has earned.
    ///
    /// Returns the ids unlocked by this call.
    pub fn unlock_earned_achievements(&mut self) -> Vec<AchievementId> {
        let earned = achievements::newly_earned(&self.state);
        if earned.is_empty() {
            return earned;
        }
        for id in &earned {
            self.state.unlock_achievement(id.clone());
        }
        info!(count = earned.len(), "achievements unlocked");
        self.persist();
        earned
    }

    // ─── Streak & reset ────────────────────────────────────────────────────────

    /// Count today's activity. Returns true if the streak changed.
    pub fn update_streak(&mut self) -> bool {
        let transition = self.state.update_streak(self.clock.today());
        if transition.changed() {
            debug!(?transition, streak = self.state.streak_count(), "streak updated");
            self.persist();
        }
        transition.changed()
    }

    /// Reset learning progress; identity, premium and preferences stay.
    pub fn reset_progress(&mut self) {
        self.state.reset_progress();
        info!("progress reset");
        self.persist();
    }

    // ─── Preferences ───────────────────────────────────────────────────────────

    pub fn toggle_theme(&mut self) -> bool {
        let value = self.state.preferences_mut().toggle_theme();
        self.persist();
        value
    }

    pub fn toggle_notifications(&mut self) -> bool {
        let value = self.state.preferences_mut().toggle_notifications();
        self.persist();
        value
    }

    pub fn toggle_sound_effects(&mut self) -> bool {
        let value = self.state.preferences_mut().toggle_sound_effects();
        self.persist();
        value
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────────

    /// Queue a full-state write of the current state.
    pub fn save(&self) {
        self.persist();
    }

    /// Wait for queued writes and sync events to be attempted.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.flush().await;
        }
    }

    /// Drain the background workers and stop them.
    pub async fn shutdown(mut self) {
        if let Some(writer) = self.writer.take() {
            writer.shutdown().await;
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown().await;
        }
    }

    fn persist(&self) {
        if !self.is_loaded {
            debug!("progress not loaded yet, skipping write");
            return;
        }
        let Some(writer) = &self.writer else {
            return;
        };
        match encode_progress(&self.state, self.token.as_ref()) {
            Ok(plan) => writer.write(plan),
            Err(err) => warn!(error = %err, "failed to encode progress, write skipped"),
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let (Some(dispatcher), Some(token)) = (&self.dispatcher, &self.token) {
            dispatcher.dispatch(token.clone(), event);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use duo_core::model::MAX_HEARTS;
    use duo_core::time::{fixed_clock, fixed_today};
    use std::sync::Mutex;
    use storage::repository::{InMemoryStore, StorageError};

    use crate::error::SyncError;

    fn question(q: &str) -> QuestionRecord {
        QuestionRecord::new(q, vec!["a".into(), "b".into()], "a", "because")
    }

    async fn loaded_engine(store: &InMemoryStore) -> ProgressEngine {
        let mut engine = ProgressEngine::new(Arc::new(store.clone()), fixed_clock());
        engine.initialize().await;
        engine
    }

    async fn seed(store: &InMemoryStore, streak: u32, last_active: Option<NaiveDate>) {
        store.set("user_streak", &streak.to_string()).await.unwrap();
        if let Some(day) = last_active {
            store
                .set("user_lastActiveDate", &day.format("%Y-%m-%d").to_string())
                .await
                .unwrap();
        }
    }

    /// Fails reads for the listed keys and delegates everything else.
    struct UnreadableKeys {
        inner: InMemoryStore,
        broken: &'static [&'static str],
    }

    #[async_trait]
    impl KeyValueStore for UnreadableKeys {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.broken.iter().any(|b| *b == key) {
                return Err(StorageError::Connection("read failed".into()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }

        async fn clear(&self) -> Result<(), StorageError> {
            self.inner.clear().await
        }
    }

    #[derive(Default)]
    struct RecordingSync {
        events: Mutex<Vec<SyncEvent>>,
    }

    #[async_trait]
    impl ProgressSync for RecordingSync {
        async fn push(&self, _token: &AuthToken, event: &SyncEvent) -> Result<(), SyncError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_storage_yields_defaults() {
        let store = InMemoryStore::new();
        let snapshot = loaded_engine(&store).await.snapshot();

        assert!(snapshot.is_loaded);
        assert_eq!(snapshot.hearts, MAX_HEARTS);
        assert_eq!(snapshot.xp, 0);
        assert!(snapshot.completed_levels.is_empty());
        assert!(snapshot.mistakes.is_empty());
        assert!(snapshot.achievements.is_empty());
        assert_eq!(snapshot.streak_count, 0);
        assert_eq!(snapshot.last_active_date, None);
        assert!(!snapshot.is_dark);
        assert!(snapshot.notifications);
        assert!(snapshot.sound_effects);
        assert!(!snapshot.is_premium);
    }

    #[tokio::test]
    async fn unreadable_keys_fall_back_to_defaults() {
        let inner = InMemoryStore::new();
        inner.set("user_xp", "80").await.unwrap();
        inner.set("user_hearts", "2").await.unwrap();
        inner.set("user_streak", "6").await.unwrap();
        inner.set("user_isDark", "true").await.unwrap();
        let store = UnreadableKeys {
            inner,
            broken: &["user_xp", "user_streak"],
        };
        let mut engine = ProgressEngine::new(Arc::new(store), fixed_clock());

        let snapshot = engine.initialize().await;

        assert!(snapshot.is_loaded);
        assert_eq!(snapshot.xp, 0);
        assert_eq!(snapshot.streak_count, 0);
        assert_eq!(snapshot.hearts, 2);
        assert!(snapshot.is_dark);
    }

    #[tokio::test]
    async fn streak_starts_at_one_without_history() {
        let store = InMemoryStore::new();
        let mut engine = loaded_engine(&store).await;

        assert!(engine.update_streak());
        assert_eq!(engine.snapshot().streak_count, 1);
        assert_eq!(engine.snapshot().last_active_date, Some(fixed_today()));
    }

    #[tokio::test]
    async fn streak_continues_from_yesterday() {
        let store = InMemoryStore::new();
        seed(&store, 4, Some(fixed_today() - Duration::days(1))).await;
        let mut engine = loaded_engine(&store).await;

        assert!(engine.update_streak());
        assert_eq!(engine.snapshot().streak_count, 5);
        assert_eq!(engine.snapshot().last_active_date, Some(fixed_today()));
    }

    #[tokio::test]
    async fn streak_counts_once_per_day() {
        let store = InMemoryStore::new();
        seed(&store, 2, Some(fixed_today())).await;
        let mut engine = loaded_engine(&store).await;

        assert!(!engine.update_streak());
        assert!(!engine.update_streak());
        assert_eq!(engine.snapshot().streak_count, 2);
    }

    #[tokio::test]
    async fn streak_resets_after_gap() {
        let store = InMemoryStore::new();
        seed(&store, 10, Some(fixed_today() - Duration::days(3))).await;
        let mut engine = loaded_engine(&store).await;

        assert!(engine.update_streak());
        assert_eq!(engine.snapshot().streak_count, 1);
    }

    #[tokio::test]
    async fn writes_reach_storage_after_flush() {
        let store = InMemoryStore::new();
        let mut engine = loaded_engine(&store).await;

        engine.add_xp(10);
        engine.deduct_heart();
        engine.complete_level("arrays");
        engine.flush().await;

        assert_eq!(store.get("user_xp").await.unwrap().as_deref(), Some("10"));
        assert_eq!(store.get("user_hearts").await.unwrap().as_deref(), Some("4"));
        assert_eq!(
            store.get("user_levels").await.unwrap().as_deref(),
            Some(r#"["arrays"]"#)
        );
    }

    #[tokio::test]
    async fn mutations_before_load_do_not_touch_storage() {
        let store = InMemoryStore::new();
        store.set("user_xp", "300").await.unwrap();
        let mut engine = ProgressEngine::new(Arc::new(store.clone()), fixed_clock());

        engine.add_xp(5);
        engine.deduct_heart();
        assert!(!engine.is_locked_out());
        assert_eq!(store.get("user_xp").await.unwrap().as_deref(), Some("300"));

        let snapshot = engine.initialize().await;
        assert_eq!(snapshot.xp, 300);
        assert_eq!(snapshot.hearts, MAX_HEARTS);
    }

    #[tokio::test]
    async fn lockout_only_after_load() {
        let store = InMemoryStore::new();
        store.set("user_hearts", "0").await.unwrap();
        let mut engine = ProgressEngine::new(Arc::new(store.clone()), fixed_clock());
        assert!(!engine.is_locked_out());

        engine.initialize().await;
        assert!(engine.is_locked_out());

        engine.toggle_premium();
        assert!(!engine.is_locked_out());
    }

    #[tokio::test]
    async fn premium_keeps_hearts() {
        let store = InMemoryStore::new();
        let mut engine = loaded_engine(&store).await;
        engine.deduct_heart();
        engine.toggle_premium();

        for _ in 0..8 {
            assert!(!engine.deduct_heart());
        }
        assert_eq!(engine.snapshot().hearts, MAX_HEARTS - 1);
    }

    #[tokio::test]
    async fn reset_progress_keeps_preferences() {
        let store = InMemoryStore::new();
        let mut engine = loaded_engine(&store).await;
        engine.toggle_theme();
        engine.toggle_notifications();
        engine.add_xp(50);
        engine.complete_level("graphs");
        engine.add_mistake(question("q1"));
        engine.unlock_achievement("first_win");
        engine.update_streak();
        engine.deduct_heart();

        engine.reset_progress();
        engine.flush().await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.hearts, MAX_HEARTS);
        assert_eq!(snapshot.xp, 0);
        assert!(snapshot.completed_levels.is_empty());
        assert!(snapshot.mistakes.is_empty());
        assert!(snapshot.achievements.is_empty());
        assert_eq!(snapshot.streak_count, 0);
        assert!(snapshot.is_dark);
        assert!(!snapshot.notifications);
        assert!(snapshot.sound_effects);
        assert_eq!(store.get("user_isDark").await.unwrap().as_deref(), Some("true"));
        assert_eq!(store.get("user_lastActiveDate").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_wipes_storage_and_preferences() {
        let store = InMemoryStore::new();
        let mut engine = loaded_engine(&store).await;
        engine.sign_in(User::new("u-1", "Ada", "ada@example.com"), Some(AuthToken::new("t")));
        engine.toggle_theme();
        engine.toggle_premium();
        engine.add_xp(70);
        engine.flush().await;
        assert_eq!(store.get("user_token").await.unwrap().as_deref(), Some("t"));

        engine.sign_out();
        engine.flush().await;

        assert!(store.is_empty().unwrap());
        let snapshot = engine.snapshot();
        assert!(snapshot.user.is_none());
        assert!(!snapshot.is_dark);
        assert!(!snapshot.is_premium);
        assert_eq!(snapshot.xp, 0);
    }

    #[tokio::test]
    async fn sign_in_without_token_drops_stored_token() {
        let store = InMemoryStore::new();
        store.set("user_token", "old").await.unwrap();
        let mut engine = loaded_engine(&store).await;

        engine.sign_in(User::new("u-2", "Lin", "lin@example.com"), None);
        engine.flush().await;

        assert_eq!(store.get("user_token").await.unwrap(), None);
        assert!(store.get("user").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn earned_achievements_unlock_once() {
        let store = InMemoryStore::new();
        let mut engine = loaded_engine(&store).await;
        engine.complete_level("arrays");
        engine.add_xp(120);

        let unlocked = engine.unlock_earned_achievements();
        assert_eq!(
            unlocked,
            vec![AchievementId::new("first_win"), AchievementId::new("novice_coder")]
        );
        assert!(engine.unlock_earned_achievements().is_empty());
    }

    #[tokio::test]
    async fn sync_events_only_when_signed_in_and_changed() {
        let store = InMemoryStore::new();
        let sync = Arc::new(RecordingSync::default());
        let mut engine = ProgressEngine::new(Arc::new(store.clone()), fixed_clock())
            .with_sync(sync.clone());
        engine.initialize().await;

        engine.add_xp(10);
        engine.flush().await;
        assert!(sync.events.lock().unwrap().is_empty());

        engine.sign_in(User::new("u-1", "Ada", "ada@example.com"), Some(AuthToken::new("t")));
        engine.add_xp(20);
        engine.add_xp(0);
        engine.complete_level("arrays");
        engine.complete_level("arrays");
        engine.deduct_heart();
        engine.toggle_premium();
        engine.deduct_heart();
        engine.flush().await;

        let events = sync.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                SyncEvent::XpAwarded { amount: 20 },
                SyncEvent::LevelCompleted {
                    slug: LevelSlug::new("arrays")
                },
                SyncEvent::HeartDeducted,
            ]
        );
    }

    #[tokio::test]
    async fn saturated_xp_syncs_only_the_gain() {
        let store = InMemoryStore::new();
        let sync = Arc::new(RecordingSync::default());
        let mut engine = ProgressEngine::new(Arc::new(store.clone()), fixed_clock())
            .with_sync(sync.clone());
        engine.initialize().await;
        engine.sign_in(User::new("u-1", "Ada", "ada@example.com"), Some(AuthToken::new("t")));

        engine.add_xp(u64::MAX - 5);
        engine.add_xp(100);
        engine.add_xp(100);
        engine.flush().await;

        assert_eq!(engine.snapshot().xp, u64::MAX);
        let events = sync.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                SyncEvent::XpAwarded { amount: u64::MAX - 5 },
                SyncEvent::XpAwarded { amount: 5 },
            ]
        );
    }

    #[tokio::test]
    async fn initialize_twice_is_noop() {
        let store = InMemoryStore::new();
        let mut engine = loaded_engine(&store).await;
        engine.add_xp(9);

        let snapshot = engine.initialize().await;
        assert_eq!(snapshot.xp, 9);
    }
}
