//! Client bindings and installed-flow bookkeeping.
//!
//! # Responsibilities
//! - Remember which server each client was admitted to, and its MAC and port
//! - Remember which (ingress port, server) pairs already have rules on the switch
//! - Stay bounded: least recently used entries go first when a table is full
//!
//! Both tables take `now` explicitly so expiry can be tested without sleeping.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::controller::rules::ClientEndpoint;
use crate::load_balancer::ServerEndpoint;

/// A client pinned to a server.
#[derive(Debug, Clone)]
pub struct ClientBinding {
    pub client: ClientEndpoint,
    pub server: Arc<ServerEndpoint>,
    pub bound_at: Instant,
    pub last_seen: Instant,
}

/// Serializable view of a binding.
#[derive(Debug, Clone, Serialize)]
pub struct BindingSnapshot {
    pub client_ip: Ipv4Addr,
    pub client_mac: String,
    pub client_port: u16,
    pub server: String,
    pub server_ip: Ipv4Addr,
    pub age_secs: u64,
    pub idle_secs: u64,
}

/// Client address → binding.
#[derive(Debug)]
pub struct BindingTable {
    inner: DashMap<Ipv4Addr, ClientBinding>,
    max_entries: usize,
    /// Zero disables idle expiry.
    idle_timeout: Duration,
}

impl BindingTable {
    pub fn new(max_entries: usize, idle_timeout: Duration) -> Self {
        Self {
            inner: DashMap::new(),
            max_entries: max_entries.max(1),
            idle_timeout,
        }
    }

    /// Return the client's server, binding it to `select()` if it has none.
    ///
    /// The client's MAC and port are refreshed either way. The boolean is
    /// true when a new binding was created.
    pub fn bind_or_get<F>(&self, client: ClientEndpoint, now: Instant, select: F) -> (Arc<ServerEndpoint>, bool)
    where
        F: FnOnce() -> Arc<ServerEndpoint>,
    {
        self.make_room_for(client.ip);

        match self.inner.entry(client.ip) {
            Entry::Occupied(mut entry) => {
                let binding = entry.get_mut();
                binding.client = client;
                binding.last_seen = now;
                (binding.server.clone(), false)
            }
            Entry::Vacant(entry) => {
                let server = select();
                entry.insert(ClientBinding {
                    client,
                    server: server.clone(),
                    bound_at: now,
                    last_seen: now,
                });
                (server, true)
            }
        }
    }

    /// Bind the client to `server` unconditionally; returns the previous server.
    pub fn rebind(&self, client: ClientEndpoint, server: Arc<ServerEndpoint>, now: Instant) -> Option<Arc<ServerEndpoint>> {
        self.make_room_for(client.ip);
        self.inner
            .insert(
                client.ip,
                ClientBinding {
                    client,
                    server,
                    bound_at: now,
                    last_seen: now,
                },
            )
            .map(|previous| previous.server)
    }

    pub fn get(&self, client_ip: Ipv4Addr) -> Option<ClientBinding> {
        self.inner.get(&client_ip).map(|r| r.value().clone())
    }

    /// Mark the binding as used.
    pub fn touch(&self, client_ip: Ipv4Addr, now: Instant) {
        if let Some(mut binding) = self.inner.get_mut(&client_ip) {
            binding.last_seen = now;
        }
    }

    /// Drop the binding only if it still points at `server_index`.
    pub fn remove_if_server(&self, client_ip: Ipv4Addr, server_index: usize) -> bool {
        self.inner
            .remove_if(&client_ip, |_, binding| binding.server.index == server_index)
            .is_some()
    }

    /// Evict bindings idle for longer than the configured timeout, except
    /// those `in_use` reports as still carrying traffic.
    pub fn sweep_at<F>(&self, now: Instant, in_use: F) -> usize
    where
        F: Fn(&ClientBinding) -> bool,
    {
        if self.idle_timeout.is_zero() {
            return 0;
        }
        let before = self.inner.len();
        self.inner.retain(|_, binding| {
            in_use(binding) || now.saturating_duration_since(binding.last_seen) <= self.idle_timeout
        });
        before.saturating_sub(self.inner.len())
    }

    pub fn snapshot(&self, now: Instant) -> Vec<BindingSnapshot> {
        let mut out: Vec<_> = self
            .inner
            .iter()
            .map(|r| {
                let b = r.value();
                BindingSnapshot {
                    client_ip: b.client.ip,
                    client_mac: b.client.mac.to_string(),
                    client_port: b.client.port,
                    server: b.server.name.clone(),
                    server_ip: b.server.ip,
                    age_secs: now.saturating_duration_since(b.bound_at).as_secs(),
                    idle_secs: now.saturating_duration_since(b.last_seen).as_secs(),
                }
            })
            .collect();
        out.sort_by_key(|b| b.client_ip);
        out
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    // Must run before taking an entry guard: iterating while a shard is
    // locked by the same thread deadlocks.
    fn make_room_for(&self, client_ip: Ipv4Addr) {
        if self.inner.len() < self.max_entries || self.inner.contains_key(&client_ip) {
            return;
        }
        let oldest = self
            .inner
            .iter()
            .min_by_key(|r| r.value().last_seen)
            .map(|r| *r.key());
        if let Some(ip) = oldest {
            self.inner.remove(&ip);
            tracing::debug!(client = %ip, "Binding table full, evicted least recently seen client");
        }
    }
}

/// Identity of an installed rule pair for duplicate suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstalledFlowKey {
    pub in_port: u16,
    pub server: Ipv4Addr,
}

#[derive(Debug, Clone, Copy)]
struct InstalledFlow {
    client_ip: Ipv4Addr,
    installed_at: Instant,
    expires_at: Option<Instant>,
}

/// Serializable view of an installed rule pair.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledFlowSnapshot {
    pub in_port: u16,
    pub server_ip: Ipv4Addr,
    pub client_ip: Ipv4Addr,
    pub age_secs: u64,
    pub expires_in_secs: Option<u64>,
}

/// Rule pairs believed to be present in the switch.
#[derive(Debug)]
pub struct InstalledFlows {
    inner: DashMap<InstalledFlowKey, InstalledFlow>,
    max_entries: usize,
    ttl: Option<Duration>,
}

impl InstalledFlows {
    /// `ttl` should mirror the rule timeout the switch enforces.
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: DashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Try to record a rule pair. Returns false when an unexpired pair for
    /// the same key and client is already recorded, meaning nothing should
    /// be sent.
    ///
    /// Keys sharing `key.in_port` with a different server are released:
    /// the new client→server rule overwrites theirs on the switch.
    pub fn claim(&self, key: InstalledFlowKey, client_ip: Ipv4Addr, now: Instant) -> bool {
        if let Some(existing) = self.inner.get(&key) {
            let live = existing.expires_at.map_or(true, |at| at > now);
            if live && existing.client_ip == client_ip {
                return false;
            }
        }

        self.inner
            .retain(|k, _| k.in_port != key.in_port || k.server == key.server);

        if self.inner.len() >= self.max_entries && !self.inner.contains_key(&key) {
            let oldest = self
                .inner
                .iter()
                .min_by_key(|r| r.value().installed_at)
                .map(|r| *r.key());
            if let Some(k) = oldest {
                self.inner.remove(&k);
            }
        }

        self.inner.insert(
            key,
            InstalledFlow {
                client_ip,
                installed_at: now,
                expires_at: self.ttl.map(|ttl| now + ttl),
            },
        );
        true
    }

    pub fn release(&self, key: &InstalledFlowKey) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Clients that currently have a rule pair on the switch.
    pub fn live_clients(&self) -> HashSet<Ipv4Addr> {
        self.inner.iter().map(|r| r.value().client_ip).collect()
    }

    /// Drop keys whose rules the switch has already expired.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.inner.len();
        self.inner
            .retain(|_, flow| flow.expires_at.map_or(true, |at| at > now));
        before.saturating_sub(self.inner.len())
    }

    pub fn snapshot(&self, now: Instant) -> Vec<InstalledFlowSnapshot> {
        let mut out: Vec<_> = self
            .inner
            .iter()
            .map(|r| InstalledFlowSnapshot {
                in_port: r.key().in_port,
                server_ip: r.key().server,
                client_ip: r.value().client_ip,
                age_secs: now.saturating_duration_since(r.value().installed_at).as_secs(),
                expires_in_secs: r
                    .value()
                    .expires_at
                    .map(|at| at.saturating_duration_since(now).as_secs()),
            })
            .collect();
        out.sort_by_key(|f| (f.in_port, f.server_ip));
        out
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}
