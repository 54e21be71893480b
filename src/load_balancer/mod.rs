//! Server selection subsystem.
//!
//! # Data Flow
//! ```text
//! VIP ARP request / first packet from an unbound client
//!     → pool.rs (fixed, ordered server list)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through servers)
//!     → server.rs (endpoint: ip, mac, switch port)
//! ```
//!
//! # Design Decisions
//! - Pool is validated non-empty at construction, so selection cannot fail
//! - The rotation cursor lives in the selector instance, not in a global
//! - Cursor updates are atomic; concurrent callers each get a distinct slot

pub mod pool;
pub mod round_robin;
pub mod server;

use std::num::NonZeroUsize;

pub use pool::{PoolError, ServerPool, MAX_SERVERS};
pub use round_robin::RoundRobin;
pub use server::ServerEndpoint;

/// Server selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Index of the server to use next, in `[0, len)`.
    fn next_index(&self, len: NonZeroUsize) -> usize;

    fn name(&self) -> &'static str;
}
