//! Service layer for the rendezvous pipeline
//!
//! Application state, process roles, startup and graceful shutdown, and the
//! health checks the monitoring endpoints answer from.

pub mod app;
pub mod health;

pub use app::{AppState, Application, ServiceError, ServiceRole};
pub use health::{HealthCheck, HealthStatus};
