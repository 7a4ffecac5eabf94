//! Domain-services protocol engine.
//!
//! Registers the guest's capabilities with the domain manager over one
//! message channel and serves the manager's requests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Domain Services Stack                      │
//! │                                                                 │
//! │  ┌───────────┐   ┌──────────┐   ┌────────────┐                  │
//! │  │ Transport │──▶│  Codec   │──▶│  Dispatch  │──▶ handshake     │
//! │  │ (trait)   │   │ (tag+len)│   │ (by handle)│──▶ handlers      │
//! │  └───────────┘   └──────────┘   └────────────┘──▶ dr_cpu queue  │
//! │       ▲                                      └──▶ var_config    │
//! │       │                                                         │
//! │  ┌───────────┐   ┌──────────────┐   ┌───────────────┐           │
//! │  │   Link    │◀──│ DrCpuWorker  │──▶│ Platform ports│           │
//! │  │ (retries) │◀──│ set_var etc. │   │ (hotplug, MD) │           │
//! │  └───────────┘   └──────────────┘   └───────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod dispatch;
pub mod dr_cpu;
pub mod engine;
pub mod handlers;
pub mod handshake;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod var_config;

pub use engine::DsEngine;
pub use registry::{CapState, CapabilityKind, HandshakePhase};
pub use transport::{ChannelEvent, Transport};
