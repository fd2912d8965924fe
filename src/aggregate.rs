//! Fan-out execution and row aggregation across shards.
//!
//! A plan's targets are queried concurrently, but the collected result sets
//! keep plan order, so rows always stream back shard-by-shard in discovery
//! order regardless of which shard answered first.

use async_trait::async_trait;
use futures::future::join_all;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};
use tracing::{debug, instrument, warn};

use crate::config::ShardErrorPolicy;
use crate::error::{RouteError, RouteResult};
use crate::pool::{ConnectionPool, MySqlConnector};
use crate::resolver::ShardPlan;
use crate::types::{ColumnInfo, ResultSet, ShardRoute};

/// Runs one rewritten statement against one shard. The production
/// implementation goes through the connection pool; tests substitute
/// canned responses.
#[async_trait]
pub trait ShardExecutor: Send + Sync {
    async fn fetch(&self, route: &ShardRoute, sql: &str) -> RouteResult<ResultSet>;
}

/// Pool-backed executor. Each fetch borrows a slot from the shard's node,
/// runs the statement, and returns the slot on drop; a statement failure
/// retires the slot until the next healing pass.
pub struct PooledExecutor<'a> {
    pool: &'a ConnectionPool<MySqlConnector>,
}

impl<'a> PooledExecutor<'a> {
    pub fn new(pool: &'a ConnectionPool<MySqlConnector>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShardExecutor for PooledExecutor<'_> {
    async fn fetch(&self, route: &ShardRoute, sql: &str) -> RouteResult<ResultSet> {
        let mut conn = self.pool.acquire(&route.host, route.port)?;
        match sqlx::query(sql).fetch_all(&mut *conn).await {
            Ok(rows) => Ok(rows_to_result_set(&rows)),
            Err(e) => {
                // The slot's connection state is unknown after a failure;
                // retire it rather than hand it to the next statement.
                conn.mark_dead();
                Err(RouteError::shard_execution(
                    &route.host,
                    route.port,
                    e.to_string(),
                ))
            }
        }
    }
}

fn rows_to_result_set(rows: &[MySqlRow]) -> ResultSet {
    let columns = match rows.first() {
        Some(row) => row
            .columns()
            .iter()
            .map(|c| ColumnInfo {
                name: c.name().to_string(),
                data_type: c.type_info().name().to_string(),
            })
            .collect(),
        None => Vec::new(),
    };
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode_column(row, i)).collect())
        .collect();
    ResultSet { columns, rows }
}

/// Decodes one cell to its textual form, trying the common MySQL types in
/// turn. Undecodable values degrade to null rather than failing the row.
fn decode_column(row: &MySqlRow, index: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|x| x.to_string());
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v.map(|x| x.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(|x| x.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(|x| x.to_string());
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map(|b| String::from_utf8_lossy(&b).into_owned());
    }
    None
}

/// Runs every plan target concurrently and collects the non-empty result
/// sets in plan order. A failing shard either aborts the whole statement
/// (`FailFast`) or is logged and dropped from the result (`SkipShard`).
#[instrument(skip(executor, plan), fields(shards = plan.len()))]
pub async fn execute_plan<E: ShardExecutor>(
    executor: &E,
    plan: &ShardPlan,
    policy: ShardErrorPolicy,
) -> RouteResult<Vec<ResultSet>> {
    let fetches = plan
        .shards
        .iter()
        .map(|target| executor.fetch(&target.route, &target.sql));
    let outcomes = join_all(fetches).await;

    let mut sets = Vec::new();
    for (target, outcome) in plan.shards.iter().zip(outcomes) {
        match outcome {
            Ok(set) => {
                debug!(host = %target.route.host, rows = set.rows.len(), "shard answered");
                if !set.rows.is_empty() {
                    sets.push(set);
                }
            }
            Err(e) => match policy {
                ShardErrorPolicy::FailFast => return Err(e),
                ShardErrorPolicy::SkipShard => {
                    warn!(
                        host = %target.route.host,
                        port = target.route.port,
                        error = %e,
                        "shard skipped"
                    );
                }
            },
        }
    }
    Ok(sets)
}

/// Forward-only cursor over an ordered sequence of result sets. Rows come
/// back set-by-set; exhausted sets are skipped and the end of the last set
/// yields `None` from then on.
#[derive(Debug, Default)]
pub struct ShardCursor {
    sets: Vec<ResultSet>,
    set_index: usize,
    row_index: usize,
}

impl ShardCursor {
    pub fn new(sets: Vec<ResultSet>) -> Self {
        Self { sets, set_index: 0, row_index: 0 }
    }

    /// Column metadata of the first result set, or empty when the cursor
    /// holds no data.
    pub fn columns(&self) -> &[ColumnInfo] {
        self.sets.first().map(|s| s.columns.as_slice()).unwrap_or(&[])
    }

    pub fn next_row(&mut self) -> Option<&[Option<String>]> {
        while self.set_index < self.sets.len() {
            if self.row_index < self.sets[self.set_index].rows.len() {
                let row = &self.sets[self.set_index].rows[self.row_index];
                self.row_index += 1;
                return Some(row.as_slice());
            }
            self.set_index += 1;
            self.row_index = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ShardTarget;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Canned per-host responses; records the statements it receives.
    #[derive(Default)]
    struct MockExecutor {
        responses: HashMap<String, RouteResult<ResultSet>>,
        statements: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ShardExecutor for MockExecutor {
        async fn fetch(&self, route: &ShardRoute, sql: &str) -> RouteResult<ResultSet> {
            self.statements.lock().push(sql.to_string());
            match self.responses.get(&route.host) {
                Some(Ok(set)) => Ok(set.clone()),
                Some(Err(e)) => Err(e.clone()),
                None => Ok(ResultSet::default()),
            }
        }
    }

    fn route(host: &str) -> ShardRoute {
        ShardRoute {
            host: host.into(),
            port: 3306,
            schema: "s".into(),
            prefix: "p_".into(),
        }
    }

    fn plan(hosts: &[&str]) -> ShardPlan {
        ShardPlan {
            shards: hosts
                .iter()
                .map(|h| ShardTarget {
                    route: route(h),
                    sql: format!("select * from s.p_t -- {h}"),
                })
                .collect(),
        }
    }

    fn set(rows: &[&str]) -> ResultSet {
        ResultSet {
            columns: vec![ColumnInfo { name: "id".into(), data_type: "INT".into() }],
            rows: rows.iter().map(|r| vec![Some(r.to_string())]).collect(),
        }
    }

    #[tokio::test]
    async fn collects_non_empty_sets_in_plan_order() {
        let mut executor = MockExecutor::default();
        executor.responses.insert("h1".into(), Ok(set(&["1", "2"])));
        executor.responses.insert("h2".into(), Ok(ResultSet::default()));
        executor.responses.insert("h3".into(), Ok(set(&["7", "8", "9"])));

        let sets = execute_plan(&executor, &plan(&["h1", "h2", "h3"]), ShardErrorPolicy::FailFast)
            .await
            .expect("plan executes");
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].rows.len(), 2);
        assert_eq!(sets[1].rows.len(), 3);
    }

    #[tokio::test]
    async fn fail_fast_aborts_on_first_shard_error() {
        let mut executor = MockExecutor::default();
        executor.responses.insert("h1".into(), Ok(set(&["1"])));
        executor.responses.insert(
            "h2".into(),
            Err(RouteError::shard_execution("h2", 3306, "table gone")),
        );

        let err = execute_plan(&executor, &plan(&["h1", "h2"]), ShardErrorPolicy::FailFast)
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::ShardExecution { .. }));
    }

    #[tokio::test]
    async fn skip_shard_drops_the_failing_shard_only() {
        let mut executor = MockExecutor::default();
        executor.responses.insert("h1".into(), Ok(set(&["1"])));
        executor.responses.insert(
            "h2".into(),
            Err(RouteError::shard_execution("h2", 3306, "table gone")),
        );
        executor.responses.insert("h3".into(), Ok(set(&["3"])));

        let sets = execute_plan(
            &executor,
            &plan(&["h1", "h2", "h3"]),
            ShardErrorPolicy::SkipShard,
        )
        .await
        .expect("surviving shards answer");
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].rows[0][0].as_deref(), Some("1"));
        assert_eq!(sets[1].rows[0][0].as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn every_target_receives_its_own_statement() {
        let executor = MockExecutor::default();
        let plan = plan(&["h1", "h2"]);
        execute_plan(&executor, &plan, ShardErrorPolicy::FailFast)
            .await
            .expect("empty answers");
        let statements = executor.statements.lock();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("h1"));
        assert!(statements[1].contains("h2"));
    }

    #[test]
    fn cursor_streams_rows_set_by_set() {
        let mut cursor = ShardCursor::new(vec![set(&["1", "2"]), set(&["3", "4", "5"])]);
        let mut seen = Vec::new();
        while let Some(row) = cursor.next_row() {
            seen.push(row[0].clone().unwrap());
        }
        assert_eq!(seen, ["1", "2", "3", "4", "5"]);
        // Exhausted for good: every further call stays at end-of-data.
        assert!(cursor.next_row().is_none());
        assert!(cursor.next_row().is_none());
    }

    #[test]
    fn cursor_over_no_sets_ends_immediately() {
        let mut cursor = ShardCursor::new(Vec::new());
        assert!(cursor.next_row().is_none());
        assert!(cursor.columns().is_empty());
    }

    #[test]
    fn cursor_skips_empty_sets_between_full_ones() {
        let mut cursor =
            ShardCursor::new(vec![set(&["1"]), ResultSet::default(), set(&["2"])]);
        assert_eq!(cursor.next_row().unwrap()[0].as_deref(), Some("1"));
        assert_eq!(cursor.next_row().unwrap()[0].as_deref(), Some("2"));
        assert!(cursor.next_row().is_none());
    }

    #[test]
    fn cursor_reports_first_set_columns() {
        let cursor = ShardCursor::new(vec![set(&["1"])]);
        assert_eq!(cursor.columns().len(), 1);
        assert_eq!(cursor.columns()[0].name, "id");
    }

    #[test]
    fn null_cells_survive_aggregation() {
        let set = ResultSet {
            columns: vec![ColumnInfo { name: "note".into(), data_type: "TEXT".into() }],
            rows: vec![vec![None], vec![Some("x".into())]],
        };
        let mut cursor = ShardCursor::new(vec![set]);
        assert_eq!(cursor.next_row().unwrap()[0], None);
        assert_eq!(cursor.next_row().unwrap()[0].as_deref(), Some("x"));
    }
}
