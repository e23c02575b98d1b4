//! Mapping between `ProgressState` and one key-value entry per field.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use duo_core::model::{AuthToken, PersistedProgress, ProgressState};
use duo_core::streak::{format_active_date, parse_active_date};
use storage::keys::StorageKey;
use storage::repository::KeyValueStore;

use crate::error::CodecError;

/// State and credentials read back at startup.
#[derive(Debug, Clone, Default)]
pub struct LoadedProgress {
    pub state: ProgressState,
    pub token: Option<AuthToken>,
}

/// Full-state write: entries to upsert and keys to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    pub set: Vec<(&'static str, String)>,
    pub remove: Vec<&'static str>,
}

//
// ─── LOAD ──────────────────────────────────────────────────────────────────────
//

/// Read every progress key, defaulting anything missing or malformed.
///
/// Never fails: read errors are logged and treated as missing keys.
pub async fn load_progress(store: &dyn KeyValueStore) -> LoadedProgress {
    let mut persisted = PersistedProgress::default();
    let mut token = None;

    for key in StorageKey::ALL {
        let raw = match store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to read progress field, using default");
                continue;
            }
        };

        if let Err(err) = apply_field(&mut persisted, &mut token, key, &raw) {
            warn!(key = %key, error = %err, "malformed progress field, using default");
        }
    }

    debug!(
        signed_in = persisted.user.is_some(),
        has_token = token.is_some(),
        "progress fields loaded"
    );

    LoadedProgress {
        state: ProgressState::from_persisted(persisted),
        token,
    }
}

fn apply_field(
    persisted: &mut PersistedProgress,
    token: &mut Option<AuthToken>,
    key: StorageKey,
    raw: &str,
) -> Result<(), CodecError> {
    match key {
        StorageKey::User => persisted.user = Some(decode_json(raw)?),
        StorageKey::Token => {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                *token = Some(AuthToken::new(trimmed));
            }
        }
        StorageKey::Xp => persisted.xp = Some(decode_count(key, raw)?),
        StorageKey::Hearts => {
            // Negative values clamp to zero; the upper bound is enforced by the state.
            let hearts = decode_int(key, raw)?;
            persisted.hearts = Some(u64::try_from(hearts.max(0)).unwrap_or(0));
        }
        StorageKey::Levels => persisted.completed_levels = decode_json(raw)?,
        StorageKey::Mistakes => persisted.mistakes = decode_json(raw)?,
        StorageKey::Achievements => persisted.achievements = decode_json(raw)?,
        StorageKey::IsDark => persisted.is_dark = Some(decode_json(raw)?),
        StorageKey::Notifications => persisted.notifications = Some(decode_json(raw)?),
        StorageKey::SoundEffects => persisted.sound_effects = Some(decode_json(raw)?),
        StorageKey::IsPremium => persisted.is_premium = Some(decode_json(raw)?),
        StorageKey::Streak => {
            let count = decode_count(key, raw)?;
            persisted.streak_count = Some(u32::try_from(count).map_err(|_| {
                CodecError::InvalidValue {
                    key: key.as_str(),
                    reason: format!("streak out of range: {count}"),
                }
            })?);
        }
        StorageKey::LastActiveDate => {
            let day = parse_active_date(raw).map_err(|err| CodecError::InvalidValue {
                key: key.as_str(),
                reason: err.to_string(),
            })?;
            persisted.last_active_date = Some(day);
        }
    }
    Ok(())
}

fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

fn decode_int(key: StorageKey, raw: &str) -> Result<i64, CodecError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|err| CodecError::InvalidValue {
            key: key.as_str(),
            reason: err.to_string(),
        })
}

// Unsigned parse: counts may exceed `i64::MAX`, and a minus sign is rejected.
fn decode_count(key: StorageKey, raw: &str) -> Result<u64, CodecError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| CodecError::InvalidValue {
            key: key.as_str(),
            reason: err.to_string(),
        })
}

//
// ─── ENCODE ────────────────────────────────────────────────────────────────────
//

/// Serialize the whole state into a write plan.
///
/// # Errors
///
/// Returns `CodecError::Json` if a collection cannot be serialized.
pub fn encode_progress(
    state: &ProgressState,
    token: Option<&AuthToken>,
) -> Result<WritePlan, CodecError> {
    let mut plan = WritePlan::default();
    let prefs = state.preferences();

    match state.user() {
        Some(user) => plan
            .set
            .push((StorageKey::User.as_str(), serde_json::to_string(user)?)),
        None => plan.remove.push(StorageKey::User.as_str()),
    }
    match token {
        Some(token) => plan
            .set
            .push((StorageKey::Token.as_str(), token.expose().to_string())),
        None => plan.remove.push(StorageKey::Token.as_str()),
    }

    plan.set.extend([
        (StorageKey::Xp.as_str(), state.xp().to_string()),
        (
            StorageKey::Levels.as_str(),
            serde_json::to_string(state.completed_levels())?,
        ),
        (StorageKey::Hearts.as_str(), state.hearts().to_string()),
        (
            StorageKey::Mistakes.as_str(),
            serde_json::to_string(state.mistakes())?,
        ),
        (
            StorageKey::Achievements.as_str(),
            serde_json::to_string(state.achievements())?,
        ),
        (StorageKey::IsDark.as_str(), prefs.is_dark.to_string()),
        (
            StorageKey::Notifications.as_str(),
            prefs.notifications.to_string(),
        ),
        (
            StorageKey::SoundEffects.as_str(),
            prefs.sound_effects.to_string(),
        ),
        (StorageKey::IsPremium.as_str(), state.is_premium().to_string()),
        (StorageKey::Streak.as_str(), state.streak_count().to_string()),
    ]);

    match state.last_active_date() {
        Some(day) => plan
            .set
            .push((StorageKey::LastActiveDate.as_str(), format_active_date(day))),
        None => plan.remove.push(StorageKey::LastActiveDate.as_str()),
    }

    Ok(plan)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
