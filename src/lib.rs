//! shardroute — query routing core for horizontally sharded MySQL tables.
//!
//! Given a parsed statement, its table list and its WHERE predicate, this
//! crate extracts the shard-key conditions, consults a routing database to
//! discover which shards hold matching rows, rewrites the statement once per
//! shard, fans it out over a fixed-slot connection pool and aggregates the
//! result sets into a single forward-only cursor.
//!
//! Two compatibility contracts deserve attention before relying on the
//! defaults:
//! - OR predicates are flattened exactly like AND during extraction
//!   ([`config::DisjunctionPolicy::Flatten`]), which can under-select shards
//!   for disjunctive filters. `ConjunctionOnly` is the conservative opt-in.
//! - Statement rewriting is plain substring replacement
//!   ([`config::RewriteMode::Substring`]); `WordBoundary` avoids rewriting
//!   inside longer identifiers.

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod merge;
pub mod pool;
pub mod resolver;
pub mod rewrite;
pub mod types;

pub use aggregate::{execute_plan, PooledExecutor, ShardCursor, ShardExecutor};
pub use catalog::ShardCatalog;
pub use config::{
    load_instance_list, parse_instance_list, DisjunctionPolicy, RewriteMode, RoutingConfig,
    ShardErrorPolicy,
};
pub use context::ShardingContext;
pub use error::{RouteError, RouteResult};
pub use extract::ConditionExtractor;
pub use merge::merge_conditions;
pub use pool::{ConnectionPool, Connector, MySqlConnector, PooledConnection, ShardPool};
pub use resolver::{build_discovery_query, build_plan, discover, ShardPlan, ShardTarget};
pub use rewrite::rewrite_statement;
pub use types::{
    ColumnInfo, ConditionKind, ConnectionParams, FieldCondition, FieldReference, Literal,
    LiteralKind, ResultSet, ShardRoute, TableRef,
};
