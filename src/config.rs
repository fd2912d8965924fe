//! Routing configuration and the instance-list file format.
//!
//! The instance list is one shard instance per line, comma-separated with no
//! escaping: `host,port,user,password,schema,table_prefix`. Parsing stops at
//! the first `\r` or `\n` of each line; lines with fewer fields than expected
//! leave the trailing fields empty rather than erroring.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RouteError, RouteResult};
use crate::types::ConnectionParams;

/// How compound predicates are flattened during condition extraction.
///
/// The compatibility behavior (`Flatten`) collects field conditions under
/// both AND and OR compound nodes into one flat list. This is semantically
/// incorrect for OR — conditions under an OR are not simultaneously required,
/// so routing may select fewer shards than the disjunction actually touches.
/// It is kept as the default because it is the established contract of the
/// system this crate routes for. Use `ConjunctionOnly` to skip entire OR
/// subtrees instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisjunctionPolicy {
    /// Flatten AND and OR identically (compatibility default).
    #[default]
    Flatten,
    /// Collect conditions only under conjunctions; OR subtrees emit nothing.
    ConjunctionOnly,
}

/// What to do when one shard's statement execution fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardErrorPolicy {
    /// Fail the whole statement on the first shard error.
    #[default]
    FailFast,
    /// Log the failed shard and aggregate the remaining result sets.
    SkipShard,
}

/// Table-name substitution mode for per-shard statement rewriting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// Plain substring replacement. No awareness of quoting or word
    /// boundaries; this is the compatibility contract and the default.
    #[default]
    Substring,
    /// Replace only occurrences not adjacent to identifier characters.
    WordBoundary,
}

fn default_catalog_table() -> String {
    "table_map".to_string()
}

fn default_routing_table() -> String {
    "train_map".to_string()
}

fn default_shard_keys() -> Vec<String> {
    vec!["trainid".to_string(), "packageid".to_string()]
}

fn default_slots() -> usize {
    1
}

/// Static routing-database credentials plus the routing contract knobs.
///
/// The routing database is consulted over its own connection, never through
/// the shard connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub schema: String,

    /// Table listing every sharded logical table name (column `table_name`).
    #[serde(default = "default_catalog_table")]
    pub catalog_table: String,
    /// Table mapping shard-key predicates to shard endpoints (columns
    /// `serverip`, `serverport`, `shard_schema`, `shard_prefix`).
    #[serde(default = "default_routing_table")]
    pub routing_table: String,
    /// The reserved shard-key column names used for route filtering.
    #[serde(default = "default_shard_keys")]
    pub shard_key_columns: Vec<String>,

    /// Fixed slot capacity per pool node, minimum 1.
    #[serde(default = "default_slots")]
    pub slots_per_instance: usize,

    #[serde(default)]
    pub disjunction_policy: DisjunctionPolicy,
    #[serde(default)]
    pub shard_error_policy: ShardErrorPolicy,
    #[serde(default)]
    pub rewrite_mode: RewriteMode,
}

impl RoutingConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            schema: schema.into(),
            catalog_table: default_catalog_table(),
            routing_table: default_routing_table(),
            shard_key_columns: default_shard_keys(),
            slots_per_instance: default_slots(),
            disjunction_policy: DisjunctionPolicy::default(),
            shard_error_policy: ShardErrorPolicy::default(),
            rewrite_mode: RewriteMode::default(),
        }
    }

    /// Loads the config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> RouteResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RouteError::config(format!("read {}: {e}", path.as_ref().display())))?;
        serde_json::from_str(&raw).map_err(|e| RouteError::config(e.to_string()))
    }

    /// Slot capacity with the minimum of 1 enforced.
    pub fn effective_slots(&self) -> usize {
        self.slots_per_instance.max(1)
    }
}

/// Parses the instance-list text into connection parameters, one instance
/// per non-empty line. Missing trailing fields stay empty; a missing or
/// malformed port parses to 0.
pub fn parse_instance_list(raw: &str) -> Vec<ConnectionParams> {
    let mut instances = Vec::new();
    for line in raw.lines() {
        // lines() strips \n; a stray \r from CRLF files ends the line early.
        let line = line.split('\r').next().unwrap_or("");
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let mut next = || fields.next().unwrap_or("").to_string();
        let host = next();
        let port = next().trim().parse::<u16>().unwrap_or(0);
        instances.push(ConnectionParams {
            host,
            port,
            user: next(),
            password: next(),
            schema: next(),
            table_prefix: next(),
        });
    }
    instances
}

/// Reads and parses an instance-list file.
pub fn load_instance_list(path: impl AsRef<Path>) -> RouteResult<Vec<ConnectionParams>> {
    let raw = std::fs::read_to_string(path.as_ref())
        .map_err(|e| RouteError::config(format!("read {}: {e}", path.as_ref().display())))?;
    Ok(parse_instance_list(&raw))
}
