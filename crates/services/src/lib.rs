#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod persistence;
pub mod progress_codec;
pub mod progress_engine;
pub mod sync;

pub use duo_core::Clock;

pub use app_services::AppServices;
pub use config::{EngineConfig, SyncConfig};
pub use error::{AppServicesError, CodecError, ConfigError, SyncError};
pub use progress_codec::{LoadedProgress, WritePlan};
pub use progress_engine::{ProgressEngine, ProgressSnapshot};
pub use sync::{HttpProgressSync, ProgressSync, SyncDispatcher, SyncEvent};
