//! Application boundary.
//!
//! The engine core never touches the host directly. Topology queries,
//! CPU hotplug and power transitions go through the **port traits** in
//! [`ports`], so the whole engine runs against a simulator in tests.

pub mod ports;
