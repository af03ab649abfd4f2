//! blockmirror-adapter: the runtime half of the mirror.
//!
//! - `MirrorController` — connect-once lifecycle, write-back forwarding
//! - `ChangePoller` — the periodic synchronization loop
//! - `MirrorConfig` — hostname, poll period, namespace prefix
//! - `DeviceVersions` — parsed device identification info group
//! - `mock` — a scripted `DeviceClient` for tests
//!
//! The embedding process brings the tokio runtime and the tracing
//! subscriber; this crate only emits.

pub mod config;
pub mod controller;
pub mod mock;
pub mod poller;
pub mod versions;

pub use config::MirrorConfig;
pub use controller::MirrorController;
pub use poller::{ChangePoller, TickStats};
pub use versions::DeviceVersions;
