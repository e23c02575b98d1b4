use std::fmt;

/// Every key the progress engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    User,
    Token,
    Xp,
    Levels,
    Hearts,
    Mistakes,
    Achievements,
    IsDark,
    Notifications,
    SoundEffects,
    IsPremium,
    Streak,
    LastActiveDate,
}

impl StorageKey {
    pub const ALL: [StorageKey; 13] = [
        StorageKey::User,
        StorageKey::Token,
        StorageKey::Xp,
        StorageKey::Levels,
        StorageKey::Hearts,
        StorageKey::Mistakes,
        StorageKey::Achievements,
        StorageKey::IsDark,
        StorageKey::Notifications,
        StorageKey::SoundEffects,
        StorageKey::IsPremium,
        StorageKey::Streak,
        StorageKey::LastActiveDate,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::User => "user",
            StorageKey::Token => "user_token",
            StorageKey::Xp => "user_xp",
            StorageKey::Levels => "user_levels",
            StorageKey::Hearts => "user_hearts",
            StorageKey::Mistakes => "user_mistakes",
            StorageKey::Achievements => "user_achievements",
            StorageKey::IsDark => "user_isDark",
            StorageKey::Notifications => "user_notifications",
            StorageKey::SoundEffects => "user_soundEffects",
            StorageKey::IsPremium => "user_isPremium",
            StorageKey::Streak => "user_streak",
            StorageKey::LastActiveDate => "user_lastActiveDate",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
