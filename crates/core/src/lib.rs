#![forbid(unsafe_code)]

pub mod achievements;
pub mod model;
pub mod streak;
pub mod time;

pub use time::Clock;
