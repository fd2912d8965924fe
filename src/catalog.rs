//! The shard catalog: which logical tables participate in sharding.
//!
//! Loaded once at startup from the routing database's catalog table and held
//! for the process lifetime. Reads are lock-cheap and concurrent; `refresh`
//! swaps the whole set atomically under the write lock.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::config::RoutingConfig;
use crate::error::RouteResult;
use crate::resolver::routing_connection;

/// Set of logical table names known to be sharded.
#[derive(Debug, Default)]
pub struct ShardCatalog {
    tables: RwLock<HashSet<String>>,
}

impl ShardCatalog {
    /// Creates an empty catalog; call [`ShardCatalog::refresh`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a fixed table list without touching the routing
    /// database.
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: RwLock::new(tables.into_iter().map(Into::into).collect()),
        }
    }

    /// Exact-match membership test.
    pub fn contains(&self, table_name: &str) -> bool {
        self.tables.read().contains(table_name)
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// Reloads the catalog from the routing database, replacing the current
    /// set in one swap. Returns the number of sharded tables loaded.
    #[instrument(skip(self, routing), fields(catalog_table = %routing.catalog_table))]
    pub async fn refresh(&self, routing: &RoutingConfig) -> RouteResult<usize> {
        let mut conn = routing_connection(routing).await?;
        let query = format!("select table_name from {}", routing.catalog_table);
        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| crate::error::RouteError::routing(e.to_string()))?;

        let loaded: HashSet<String> = rows.into_iter().map(|(name,)| name).collect();
        let count = loaded.len();
        *self.tables.write() = loaded;
        debug!(count, "shard catalog refreshed");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_exact_match() {
        let catalog = ShardCatalog::from_tables(["orders", "items"]);
        assert!(catalog.contains("orders"));
        assert!(!catalog.contains("order"));
        assert!(!catalog.contains("orders_archive"));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn empty_catalog_matches_nothing() {
        let catalog = ShardCatalog::new();
        assert!(catalog.is_empty());
        assert!(!catalog.contains("orders"));
    }
}
