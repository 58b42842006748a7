//! Node Relay
//!
//! Everything that talks to nodes rather than listening to them.
//!
//! - **transport**: `Transport` seam and the HTTP implementation
//! - **command**: Fire-and-forget operator commands
//! - **observer**: Sense observations of registered nodes
//! - **poller**: Periodic status reads of active nodes

pub mod command;
pub mod observer;
pub mod poller;
pub mod transport;

pub use command::{Command, CommandRelay, RelayError};
pub use observer::{Notification, SenseObserver};
pub use poller::StatusPoller;
pub use transport::{HttpTransport, Transport, TransportConfig, TransportError};
