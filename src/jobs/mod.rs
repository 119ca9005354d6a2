//! Job service facade.

pub mod service;

pub use service::{CreateJobRequest, JobDto, JobService, publish_job_event};
