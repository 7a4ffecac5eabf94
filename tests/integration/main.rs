//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises one subsystem end to end: a real engine on
//! the loopback channel, a scripted domain manager on the host end and
//! the simulated platform underneath.

mod dispatch_tests;
mod handshake_tests;
mod mock_host;
mod power_tests;
