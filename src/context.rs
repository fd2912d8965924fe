//! Process-wide sharding context.
//!
//! One `ShardingContext` owns the routing configuration, the shard catalog
//! and the connection pool, and exposes the statement lifecycle end to end:
//! extract and merge conditions, discover routes, rewrite per shard, fan
//! out, aggregate. The context is immutable after init apart from interior
//! catalog refreshes and pool healing, so it can be shared behind an `Arc`.

use sqlparser::ast::Expr;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::aggregate::{execute_plan, PooledExecutor, ShardCursor};
use crate::catalog::ShardCatalog;
use crate::config::RoutingConfig;
use crate::error::RouteResult;
use crate::extract::ConditionExtractor;
use crate::merge::merge_conditions;
use crate::pool::{ConnectionPool, MySqlConnector, ShardPool};
use crate::resolver::{build_plan, discover, ShardPlan};
use crate::types::{ConnectionParams, FieldCondition, TableRef};

pub struct ShardingContext {
    routing: RoutingConfig,
    catalog: ShardCatalog,
    pool: ShardPool,
}

impl ShardingContext {
    /// Brings the context up: loads the shard catalog from the routing
    /// database, builds the pool over the configured instances and runs the
    /// first healing pass. Instances that cannot be reached stay dead and
    /// are retried on later healing passes.
    #[instrument(skip_all, fields(instances = instances.len()))]
    pub async fn init(
        routing: RoutingConfig,
        instances: Vec<ConnectionParams>,
    ) -> RouteResult<Self> {
        let catalog = ShardCatalog::new();
        catalog.refresh(&routing).await?;

        let pool = ConnectionPool::new(instances, MySqlConnector, routing.effective_slots());
        let alive = pool.reconnect_all().await;
        debug!(tables = catalog.len(), alive_slots = alive, "sharding context ready");

        Ok(Self { routing, catalog, pool })
    }

    /// Assembles a context from already-built parts. Used when the catalog
    /// and pool are provisioned outside the routing database, and by tests.
    pub fn from_parts(routing: RoutingConfig, catalog: ShardCatalog, pool: ShardPool) -> Self {
        Self { routing, catalog, pool }
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    pub fn catalog(&self) -> &ShardCatalog {
        &self.catalog
    }

    pub fn pool(&self) -> &ShardPool {
        &self.pool
    }

    /// Reloads the shard catalog from the routing database.
    pub async fn refresh_catalog(&self) -> RouteResult<usize> {
        self.catalog.refresh(&self.routing).await
    }

    /// Runs one pool healing pass; returns the number of slots revived.
    pub async fn heal_pool(&self) -> usize {
        self.pool.reconnect_all().await
    }

    /// The merged condition set for a statement's predicate. No predicate
    /// means no conditions, which later makes discovery scatter to every
    /// route in the routing table.
    pub fn conditions(&self, predicate: Option<&Expr>, tables: &[TableRef]) -> Vec<FieldCondition> {
        match predicate {
            Some(expr) => {
                let raw = ConditionExtractor::new(tables, self.routing.disjunction_policy)
                    .extract(expr);
                merge_conditions(&raw)
            }
            None => Vec::new(),
        }
    }

    /// Resolves one statement to its per-shard plan: conditions, discovery
    /// against the routing table, then one rewritten statement per route.
    #[instrument(skip_all, fields(statement_id = %Uuid::new_v4()))]
    pub async fn plan_statement(
        &self,
        sql: &str,
        tables: &[TableRef],
        predicate: Option<&Expr>,
    ) -> RouteResult<ShardPlan> {
        let merged = self.conditions(predicate, tables);
        let routes = discover(&self.routing, &merged).await?;
        debug!(conditions = merged.len(), routes = routes.len(), "statement planned");
        Ok(build_plan(sql, tables, &self.catalog, routes, self.routing.rewrite_mode))
    }

    /// Fans a plan out through the pool and returns the aggregated cursor.
    pub async fn execute_plan(&self, plan: &ShardPlan) -> RouteResult<ShardCursor> {
        let executor = PooledExecutor::new(&self.pool);
        let sets = execute_plan(&executor, plan, self.routing.shard_error_policy).await?;
        Ok(ShardCursor::new(sets))
    }

    /// Plan and execute in one step.
    pub async fn execute_statement(
        &self,
        sql: &str,
        tables: &[TableRef],
        predicate: Option<&Expr>,
    ) -> RouteResult<ShardCursor> {
        let plan = self.plan_statement(sql, tables, predicate).await?;
        self.execute_plan(&plan).await
    }
}
