//! Worker pool and per-slot load tracking.
//!
//! The pool is built once at startup and immutable afterwards. Picking
//! the least-loaded slot and incrementing its in-flight counter happen
//! under one lock so concurrent requests cannot double-assign a slot.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};

use super::client::WorkerClient;
use super::wire::Connector;

#[derive(Debug, Default)]
struct Loads {
    in_flight: BTreeMap<usize, i64>,
}

/// RAII guard for one accepted streaming request. Dropping it releases
/// the slot, so every exit path (success, error, client disconnect)
/// decrements exactly once.
pub struct StreamLease {
    loads: Arc<Mutex<Loads>>,
    slot_id: usize,
}

impl StreamLease {
    #[must_use]
    pub fn slot_id(&self) -> usize {
        self.slot_id
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        let mut loads = self.loads.lock();
        if let Some(count) = loads.in_flight.get_mut(&self.slot_id) {
            *count = (*count - 1).max(0);
        }
    }
}

pub struct WorkerPool {
    clients: BTreeMap<usize, Arc<WorkerClient>>,
    loads: Arc<Mutex<Loads>>,
}

impl WorkerPool {
    /// Connect the primary client, then auxiliary clients concurrently.
    /// A failed auxiliary start is logged and its slot omitted; a failed
    /// primary start aborts startup.
    pub async fn start(connector: Arc<dyn Connector>, config: &UpstreamConfig) -> Result<Self> {
        let mut clients = BTreeMap::new();
        let mut in_flight = BTreeMap::new();

        let primary = connector
            .connect(0, &config.bot_token, true)
            .await
            .map_err(Error::from)?;
        clients.insert(0, Arc::new(WorkerClient::new(0, primary)));
        in_flight.insert(0, 0);
        info!("primary client initialized");

        let startups = config.multi_tokens.iter().map(|(&slot_id, token)| {
            let connector = connector.clone();
            let token = token.clone();
            async move {
                info!(slot_id, "starting auxiliary client");
                (slot_id, connector.connect(slot_id, &token, false).await)
            }
        });

        for (slot_id, started) in join_all(startups).await {
            match started {
                Ok(conn) => {
                    clients.insert(slot_id, Arc::new(WorkerClient::new(slot_id, conn)));
                    in_flight.insert(slot_id, 0);
                }
                Err(e) => {
                    error!(slot_id, "failed to start auxiliary client: {e}");
                }
            }
        }

        if clients.len() > 1 {
            info!("multi-client mode enabled with {} clients", clients.len());
        } else {
            info!("no auxiliary clients initialized, using primary only");
        }

        Ok(Self {
            clients,
            loads: Arc::new(Mutex::new(Loads { in_flight })),
        })
    }

    /// Pick the least-loaded slot (ties broken by lowest slot id) and
    /// acquire it in the same critical section.
    pub fn lease(&self) -> Result<(Arc<WorkerClient>, StreamLease)> {
        let mut loads = self.loads.lock();
        let slot_id = loads
            .in_flight
            .iter()
            .min_by_key(|(slot_id, count)| (**count, **slot_id))
            .map(|(slot_id, _)| *slot_id)
            .ok_or_else(|| Error::UpstreamUnavailable("no worker slots available".to_string()))?;

        let client = self
            .clients
            .get(&slot_id)
            .cloned()
            .ok_or_else(|| Error::UpstreamUnavailable("worker slot vanished".to_string()))?;

        *loads.in_flight.entry(slot_id).or_insert(0) += 1;
        Ok((
            client,
            StreamLease {
                loads: self.loads.clone(),
                slot_id,
            },
        ))
    }

    /// The primary (slot 0) client serving the bot surface.
    #[must_use]
    pub fn primary(&self) -> Arc<WorkerClient> {
        self.clients
            .get(&0)
            .cloned()
            .unwrap_or_else(|| unreachable!("pool always holds the primary slot"))
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.clients.len()
    }

    /// Snapshot of per-slot in-flight counters.
    #[must_use]
    pub fn loads(&self) -> BTreeMap<usize, i64> {
        self.loads.lock().in_flight.clone()
    }

    /// Stop all clients, primary first.
    pub async fn shutdown(&self) {
        info!("stopping all clients...");
        for (slot_id, client) in &self.clients {
            client.shutdown().await;
            info!(slot_id, "client stopped");
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn for_tests(clients: BTreeMap<usize, Arc<WorkerClient>>) -> Self {
        let in_flight = clients.keys().map(|&slot| (slot, 0)).collect();
        Self {
            clients,
            loads: Arc::new(Mutex::new(Loads { in_flight })),
        }
    }
}
