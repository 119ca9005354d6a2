//! Settings service.

pub mod service;

pub use service::{RuntimeSettings, SettingsService};
