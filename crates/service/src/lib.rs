//! HTTP service for a Solid pod.
//!
//! This crate wires the pod engine from `common` into a running server:
//! - Configuration (listen address, store backend, credential pipeline)
//! - State management (store, locks, events, ACL resolver and engine)
//! - HTTP router (pod requests, health checks, CORS and tracing)
//! - Process lifecycle (logging, signals, graceful shutdown)

pub mod config;
pub mod http;
pub mod process;
pub mod state;

// Re-export key types for convenience
pub use config::{Config, ExtractorConfig, VerifierConfig};
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use state::{State as ServiceState, StateSetupError};
