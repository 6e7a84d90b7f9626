//! Station service client.
//!
//! This crate provides:
//! - `session`: the shared, revocable credential context
//! - `repository`: the `StationRepository` trait every consumer codes against
//! - `http`: the reqwest-backed implementation of that trait
//! - `config`: timeouts, base URL and radius bounds

pub mod config;
pub mod http;
pub mod repository;
pub mod session;

pub use config::ClientConfig;
pub use http::HttpStationRepository;
pub use repository::{HealthStatus, StationRepository};
pub use session::{Credential, Session, SessionState};
