//! Fixed-capacity connection pool, one node per configured shard instance.
//!
//! Every node owns a fixed slot array created at init time; the pool never
//! creates connections on demand, so exhaustion is a normal outcome callers
//! handle (retry after a healing pass, or fail the statement). All slot
//! state transitions happen under the owning node's mutex; connections are
//! moved out of the slot while held so no lock is ever held across an await.

use std::fmt;
use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::mysql::MySqlConnection;
use sqlx::ConnectOptions;
use tracing::{debug, instrument, warn};

use crate::error::{RouteError, RouteResult};
use crate::types::ConnectionParams;

/// Seam between the pool's slot bookkeeping and the actual wire connect.
/// Production uses [`MySqlConnector`]; tests substitute a mock.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Send + 'static;

    async fn connect(&self, params: &ConnectionParams) -> RouteResult<Self::Conn>;
}

/// Connects raw MySQL connections for shard instances.
#[derive(Debug, Default)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlConnection;

    async fn connect(&self, params: &ConnectionParams) -> RouteResult<MySqlConnection> {
        sqlx::mysql::MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .password(&params.password)
            .database(&params.schema)
            .connect()
            .await
            .map_err(|e| RouteError::connection_failed(e.to_string()))
    }
}

struct ConnectionSlot<C> {
    conn: Option<C>,
    alive: bool,
    in_use: bool,
}

impl<C> ConnectionSlot<C> {
    fn reset(&mut self) {
        self.conn = None;
        self.alive = false;
        self.in_use = false;
    }
}

impl<C> Default for ConnectionSlot<C> {
    fn default() -> Self {
        Self { conn: None, alive: false, in_use: false }
    }
}

struct PoolNode<C> {
    params: ConnectionParams,
    slots: Mutex<Vec<ConnectionSlot<C>>>,
}

/// The shared pool: one [`PoolNode`] per distinct configured (host, port).
/// The node set is fixed at construction and never grows at runtime.
pub struct ConnectionPool<K: Connector> {
    connector: K,
    nodes: Vec<PoolNode<K::Conn>>,
}

/// The production pool over raw MySQL connections.
pub type ShardPool = ConnectionPool<MySqlConnector>;

impl<K: Connector> ConnectionPool<K> {
    /// Builds the pool from the configured instance list. Duplicate
    /// (host, port) entries collapse into one node; each node gets
    /// `slots_per_instance` slots (minimum 1), all initially dead.
    pub fn new(instances: Vec<ConnectionParams>, connector: K, slots_per_instance: usize) -> Self {
        let capacity = slots_per_instance.max(1);
        let mut nodes: Vec<PoolNode<K::Conn>> = Vec::new();
        for params in instances {
            let duplicate = nodes
                .iter()
                .any(|n| n.params.host == params.host && n.params.port == params.port);
            if duplicate {
                continue;
            }
            let slots = (0..capacity).map(|_| ConnectionSlot::default()).collect();
            nodes.push(PoolNode { params, slots: Mutex::new(slots) });
        }
        Self { connector, nodes }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Resets every slot in every node: connection dropped, alive and
    /// in-use cleared. Ran implicitly by `new`; callers may use it to force
    /// a full reconnect cycle before the next healing pass.
    pub fn init_slots(&self) {
        for node in &self.nodes {
            for slot in node.slots.lock().iter_mut() {
                slot.reset();
            }
        }
    }

    /// Hands out the first alive, free slot of the matching node. Never
    /// connects on demand: a dead or busy pool reports exhaustion instead.
    pub fn acquire(&self, host: &str, port: u16) -> RouteResult<PooledConnection<'_, K::Conn>> {
        let node = self
            .nodes
            .iter()
            .find(|n| n.params.host == host && n.params.port == port)
            .ok_or_else(|| RouteError::pool_exhausted(host, port))?;

        let mut slots = node.slots.lock();
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.alive && !slot.in_use {
                if let Some(conn) = slot.conn.take() {
                    slot.in_use = true;
                    return Ok(PooledConnection {
                        node,
                        index,
                        conn: Some(conn),
                        dead: false,
                    });
                }
            }
        }
        Err(RouteError::pool_exhausted(host, port))
    }

    /// Attempts to revive every dead slot from its node's stored params.
    /// Safe to call repeatedly; used at startup and for periodic healing.
    /// Returns the number of slots brought alive; individual connect
    /// failures are logged and skipped.
    #[instrument(skip(self))]
    pub async fn reconnect_all(&self) -> usize {
        let mut revived = 0;
        for node in &self.nodes {
            let dead: Vec<usize> = {
                let slots = node.slots.lock();
                slots
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !s.alive)
                    .map(|(i, _)| i)
                    .collect()
            };
            for index in dead {
                match self.connector.connect(&node.params).await {
                    Ok(conn) => {
                        let mut slots = node.slots.lock();
                        let slot = &mut slots[index];
                        // The lock was released during the connect; an
                        // overlapping healing pass may have revived this
                        // slot already (and a caller may hold it).
                        // Installing over it would hand the slot out twice.
                        if slot.alive || slot.in_use {
                            continue;
                        }
                        slot.conn = Some(conn);
                        slot.alive = true;
                        revived += 1;
                    }
                    Err(e) => {
                        warn!(
                            host = %node.params.host,
                            port = node.params.port,
                            error = %e,
                            "slot reconnect failed"
                        );
                    }
                }
            }
        }
        debug!(revived, "pool healing pass finished");
        revived
    }

    /// The distinct instances this pool serves, in configuration order.
    pub fn instances(&self) -> Vec<ConnectionParams> {
        self.nodes.iter().map(|n| n.params.clone()).collect()
    }
}

/// RAII slot guard: holds the slot's connection while in use and returns it
/// on drop, clearing in-use. No health check happens on release.
pub struct PooledConnection<'a, C> {
    node: &'a PoolNode<C>,
    index: usize,
    conn: Option<C>,
    dead: bool,
}

impl<C> PooledConnection<'_, C> {
    /// Retires this connection instead of returning it: the slot goes dead
    /// and stays unusable until the next healing pass.
    pub fn mark_dead(mut self) {
        self.conn = None;
        self.dead = true;
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.node.params
    }
}

impl<C> fmt::Debug for PooledConnection<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("host", &self.node.params.host)
            .field("port", &self.node.params.port)
            .field("slot", &self.index)
            .finish_non_exhaustive()
    }
}

impl<C> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("slot connection held until release")
    }
}

impl<C> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("slot connection held until release")
    }
}

impl<C> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        let mut slots = self.node.slots.lock();
        let slot = &mut slots[self.index];
        slot.in_use = false;
        match self.conn.take() {
            Some(conn) => slot.conn = Some(conn),
            None => {
                if self.dead {
                    slot.alive = false;
                }
            }
        }
    }
}
