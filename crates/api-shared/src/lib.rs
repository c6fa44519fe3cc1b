//! # API Shared
//!
//! Wire definitions shared by the summary APIs.
//!
//! Contains:
//! - Request and response bodies (`wire` module), with OpenAPI schemas
//! - Shared services like `HealthService`
//!
//! Nothing here validates input; `api-rest` converts these bodies into the typed requests of
//! `summary-core` before any work is done.

pub mod health;
pub mod wire;

pub use health::HealthService;
pub use wire::*;
