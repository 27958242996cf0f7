//! # Host Bridge Traits
//!
//! Capabilities the collection core needs from its host but does not
//! implement itself.
//!
//! ## Traits
//!
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//! - [`CoverArtLoader`](artwork::CoverArtLoader) - Album cover thumbnails
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability
//! is missing:
//!
//! ```ignore
//! let settings = builder.settings_store.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "SettingsStore".to_string(),
//!     message: "Inject a SettingsStore; MemorySettingsStore works for tests.".to_string(),
//! })?;
//! ```
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so implementations can be shared across
//! the backend worker task and the model's owner.

pub mod artwork;
pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use artwork::{CoverArtLoader, CoverArtRequest, CoverArtResult};
pub use storage::{group_key, MemorySettingsStore, SettingsStore};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
