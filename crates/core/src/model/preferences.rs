use serde::{Deserialize, Serialize};

/// Display and notification preferences, independent of progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub is_dark: bool,
    pub notifications: bool,
    pub sound_effects: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            is_dark: false,
            notifications: true,
            sound_effects: true,
        }
    }
}

impl Preferences {
    /// Flips the theme and returns the new value.
    pub fn toggle_theme(&mut self) -> bool {
        self.is_dark = !self.is_dark;
        self.is_dark
    }

    pub fn toggle_notifications(&mut self) -> bool {
        self.notifications = !self.notifications;
        self.notifications
    }

    pub fn toggle_sound_effects(&mut self) -> bool {
        self.sound_effects = !self.sound_effects;
        self.sound_effects
    }
}
