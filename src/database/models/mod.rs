//! Database row models.

pub mod job;
pub mod settings;
pub mod subscription;

pub use job::{Job, JobState};
pub use settings::{OutputNamingMode, Settings};
pub use subscription::Subscription;
