mod ids;
mod preferences;
mod progress;
mod question;
mod user;

pub use ids::{AchievementId, LevelSlug, ParseIdError};
pub use preferences::Preferences;
pub use progress::{MAX_HEARTS, PersistedProgress, ProgressState};
pub use question::QuestionRecord;
pub use user::{AuthToken, User};
