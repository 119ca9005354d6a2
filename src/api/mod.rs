//! HTTP/JSON boundary: a thin mapping from verbs and paths onto service
//! calls.

pub mod error;
pub mod openapi;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
