//! Domain-services control-plane engine.
//!
//! Runs inside a guest domain and speaks the domain-services protocol
//! with the domain manager over one reliable message channel: it
//! negotiates a session, registers the guest's capabilities and serves
//! machine-description updates, shutdown and panic requests, CPU
//! reconfiguration and persistent variable updates.
//!
//! The host is reached only through the traits in [`app::ports`] and
//! [`ds::transport::Transport`]; [`adapters`] provides an in-process
//! loopback channel and a simulated platform.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod ds;
pub mod error;

pub use config::EngineConfig;
pub use ds::DsEngine;
pub use error::{DsError, Result};
