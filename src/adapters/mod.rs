//! Adapters: concrete implementations of the port and transport traits.
//!
//! | Adapter        | Implements             | Connects to                 |
//! |----------------|------------------------|-----------------------------|
//! | `loopback`     | Transport              | In-process host end         |
//! | `sim_platform` | MachineDescriptionPort | Simulated topology          |
//! |                | CpuHotplugPort         | Simulated online-CPU set    |
//! |                | PowerPort              | Call log (halt panics)      |

pub mod loopback;
pub mod sim_platform;

pub use loopback::{HostEnd, LoopbackTransport, SentMessage, loopback};
pub use sim_platform::{PlatformCall, SimPlatform};
