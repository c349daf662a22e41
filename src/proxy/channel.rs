//! Upstream channels.
//!
//! A `Channel` wraps one [`HttpClient`] per upstream host and picks one per
//! request according to its load-balancing policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rand::Rng;

use crate::proxy::client::HttpClient;

/// Load-balancing policy for an upstream channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbPolicy {
    /// Uniformly random host.
    Random,
    /// Monotonic cursor modulo the host count.
    RoundRobin,
    /// Hosts expanded by their weights, cursor modulo the expanded length.
    WeightedRoundRobin,
}

/// An immutable set of upstream hosts with a selection policy.
pub struct Channel {
    clients: Vec<Arc<HttpClient>>,
    policy: LbPolicy,
    /// Client indices expanded by weight; only used for weighted RR.
    weighted: Vec<usize>,
    cursor: AtomicUsize,
}

impl Channel {
    /// Builds a channel over `hosts`. Empty `hosts` is a configuration
    /// error, as is a weight vector whose length does not match the hosts
    /// under weighted round-robin.
    pub fn new(hosts: &[String], policy: LbPolicy, weights: &[u32]) -> Result<Self> {
        if hosts.is_empty() {
            anyhow::bail!("proxy route configured without upstream hosts");
        }

        let clients = hosts
            .iter()
            .map(|host| HttpClient::new(host).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let mut weighted = Vec::new();
        if policy == LbPolicy::WeightedRoundRobin {
            if weights.len() != hosts.len() {
                anyhow::bail!(
                    "weighted round-robin needs one weight per host ({} hosts, {} weights)",
                    hosts.len(),
                    weights.len()
                );
            }
            for (index, weight) in weights.iter().enumerate() {
                for _ in 0..*weight {
                    weighted.push(index);
                }
            }
            if weighted.is_empty() {
                anyhow::bail!("weighted round-robin needs at least one non-zero weight");
            }
        }

        Ok(Self {
            clients,
            policy,
            weighted,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Selects the client for the next request.
    pub fn select(&self) -> Arc<HttpClient> {
        let index = match self.policy {
            LbPolicy::Random => rand::thread_rng().gen_range(0..self.clients.len()),
            LbPolicy::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len()
            }
            LbPolicy::WeightedRoundRobin => {
                let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.weighted.len();
                self.weighted[slot]
            }
        };
        Arc::clone(&self.clients[index])
    }

    pub fn host_count(&self) -> usize {
        self.clients.len()
    }
}
