//! Round-robin load balancing strategy.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal cursor to rotate through servers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_index(&self, len: NonZeroUsize) -> usize {
        let len = len.get();
        // The cursor is kept inside [0, len) so rotation stays fair across wrap.
        let prev = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        prev % len
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
