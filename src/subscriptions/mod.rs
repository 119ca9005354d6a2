//! Subscription tracking: CRUD, sync, scheduling, and the completion
//! feedback path.

pub mod completion;
pub mod scheduler;
pub mod service;

pub use completion::DownloadCompletionUpdater;
pub use scheduler::SubscriptionScheduler;
pub use service::{
    CreateSubscriptionRequest, SubscriptionDto, SubscriptionService, SyncResult,
    UpdateSubscriptionRequest,
};
