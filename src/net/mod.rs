//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming switch TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (id, lifecycle tracking)
//!     → session.rs (OpenFlow handshake, dispatch, writer task)
//!     → controller (packet-in handling)
//!
//! Session States:
//!     Accepted → Handshaking → Connected → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - The controller only sees the `Switch` trait, never the socket

pub mod connection;
pub mod listener;
pub mod server;
pub mod session;

pub use listener::{Listener, ListenerError};
pub use server::ControllerServer;
pub use session::{SessionError, SwitchHandle, SwitchSession};
