//! Shard resolution: from merged conditions to an executable shard plan.
//!
//! Resolution has a pure half and a network half, kept separate so the plan
//! logic is testable without a routing database:
//! - [`build_discovery_query`] renders the shard-key conditions into the
//!   discovery SELECT against the routing table.
//! - [`discover`] runs that query over the dedicated routing connection and
//!   yields one [`ShardRoute`] per row, in result order.
//! - [`build_plan`] rewrites the original statement once per route.

use sqlx::mysql::MySqlConnection;
use sqlx::{ConnectOptions, Row};
use tracing::{debug, instrument};

use crate::catalog::ShardCatalog;
use crate::config::{RewriteMode, RoutingConfig};
use crate::error::{RouteError, RouteResult};
use crate::rewrite::rewrite_statement;
use crate::types::{ConditionKind, FieldCondition, ShardRoute, TableRef};

/// One shard's slice of a statement: where to run and what to run.
#[derive(Debug, Clone)]
pub struct ShardTarget {
    pub route: ShardRoute,
    pub sql: String,
}

/// The ordered per-shard execution plan for one statement. Route order from
/// discovery is preserved through rewriting and row aggregation.
#[derive(Debug, Clone, Default)]
pub struct ShardPlan {
    pub shards: Vec<ShardTarget>,
}

impl ShardPlan {
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }
}

/// Selects the conditions that participate in routing: those whose column
/// name equals one of the reserved shard-key identifiers. Everything else
/// stays in the merged set but is excluded here.
pub fn shard_key_conditions<'a>(
    merged: &'a [FieldCondition],
    shard_keys: &[String],
) -> Vec<&'a FieldCondition> {
    merged
        .iter()
        .filter(|c| shard_keys.iter().any(|k| k == &c.field.column))
        .collect()
}

/// Renders one condition as a routing WHERE fragment.
///
/// `Range` → `col between MIN and MAX`; `ValueSet` → `col in ('v1','v2')`
/// with each value individually quoted.
pub fn render_condition(condition: &FieldCondition) -> String {
    match &condition.kind {
        ConditionKind::Range { min, max } => {
            format!(
                "{} between {} and {}",
                condition.field.column, min.text, max.text
            )
        }
        ConditionKind::ValueSet { values } => {
            let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v.text)).collect();
            format!("{} in ({})", condition.field.column, quoted.join(","))
        }
    }
}

/// Builds the discovery query against the routing table. Fragments are
/// parenthesized and joined with ` and `; with no usable fragment the WHERE
/// clause is omitted and every route matches.
pub fn build_discovery_query(conditions: &[&FieldCondition], routing_table: &str) -> String {
    let fragments: Vec<String> = conditions
        .iter()
        .filter(|c| match &c.kind {
            // An empty value set renders as `in ()`, which the routing
            // database rejects; treat it as no constraint.
            ConditionKind::ValueSet { values } => !values.is_empty(),
            ConditionKind::Range { .. } => true,
        })
        .map(|c| format!("({})", render_condition(c)))
        .collect();

    let select = format!(
        "select serverip, serverport, shard_schema, shard_prefix from {routing_table}"
    );
    if fragments.is_empty() {
        select
    } else {
        format!("{select} where {}", fragments.join(" and "))
    }
}

/// Opens the dedicated routing-database connection. Shard traffic never goes
/// through here; this connection only serves catalog and discovery queries.
pub(crate) async fn routing_connection(routing: &RoutingConfig) -> RouteResult<MySqlConnection> {
    sqlx::mysql::MySqlConnectOptions::new()
        .host(&routing.host)
        .port(routing.port)
        .username(&routing.user)
        .password(&routing.password)
        .database(&routing.schema)
        .connect()
        .await
        .map_err(|e| RouteError::routing(e.to_string()))
}

/// Runs shard discovery for the merged condition set. A connection or query
/// failure aborts resolution and is surfaced without retry; zero matching
/// rows is a normal empty result.
#[instrument(skip(routing, merged), fields(routing_table = %routing.routing_table))]
pub async fn discover(
    routing: &RoutingConfig,
    merged: &[FieldCondition],
) -> RouteResult<Vec<ShardRoute>> {
    let selected = shard_key_conditions(merged, &routing.shard_key_columns);
    let query = build_discovery_query(&selected, &routing.routing_table);
    debug!(%query, "shard discovery");

    let mut conn = routing_connection(routing).await?;
    let rows = sqlx::query(&query)
        .fetch_all(&mut conn)
        .await
        .map_err(|e| RouteError::routing(e.to_string()))?;

    let mut routes = Vec::with_capacity(rows.len());
    for row in &rows {
        let host: String = row
            .try_get("serverip")
            .map_err(|e| RouteError::routing(e.to_string()))?;
        // serverport may be stored numeric or textual; either way it must
        // be a valid port, or the routing row is unusable.
        let port: u16 = match row.try_get::<i64, _>("serverport") {
            Ok(p) => port_from_i64(p)?,
            Err(_) => {
                let raw: String = row
                    .try_get("serverport")
                    .map_err(|e| RouteError::routing(e.to_string()))?;
                port_from_text(&raw)?
            }
        };
        let schema: String = row
            .try_get("shard_schema")
            .map_err(|e| RouteError::routing(e.to_string()))?;
        let prefix: String = row
            .try_get("shard_prefix")
            .map_err(|e| RouteError::routing(e.to_string()))?;
        routes.push(ShardRoute { host, port, schema, prefix });
    }
    Ok(routes)
}

fn port_from_i64(value: i64) -> RouteResult<u16> {
    u16::try_from(value)
        .map_err(|_| RouteError::routing(format!("serverport {value} is out of range")))
}

fn port_from_text(value: &str) -> RouteResult<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| RouteError::routing(format!("serverport '{value}' is not a valid port")))
}

/// Rewrites the original statement once per route, in route order. Only
/// table names present both in the statement's table list and in the shard
/// catalog are substituted.
pub fn build_plan(
    sql: &str,
    tables: &[TableRef],
    catalog: &ShardCatalog,
    routes: Vec<ShardRoute>,
    mode: RewriteMode,
) -> ShardPlan {
    let shards = routes
        .into_iter()
        .map(|route| {
            let rewritten = rewrite_statement(sql, tables, catalog, &route, mode);
            ShardTarget { route, sql: rewritten }
        })
        .collect();
    ShardPlan { shards }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldReference, Literal};

    fn field(column: &str) -> FieldReference {
        FieldReference {
            schema: "shop".into(),
            table: "orders".into(),
            alias: "orders".into(),
            alias_used: false,
            column: column.into(),
        }
    }

    fn keys() -> Vec<String> {
        vec!["trainid".into(), "packageid".into()]
    }

    #[test]
    fn filters_to_reserved_shard_keys_only() {
        let merged = vec![
            FieldCondition::value_set(field("trainid"), vec![Literal::integer("1")]),
            FieldCondition::value_set(field("status"), vec![Literal::text("open")]),
            FieldCondition::value_set(field("packageid"), vec![Literal::integer("7")]),
        ];
        let selected = shard_key_conditions(&merged, &keys());
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].field.column, "trainid");
        assert_eq!(selected[1].field.column, "packageid");
    }

    #[test]
    fn renders_range_fragment() {
        let condition =
            FieldCondition::range(field("trainid"), Literal::integer("5"), Literal::integer("9"));
        assert_eq!(render_condition(&condition), "trainid between 5 and 9");
    }

    #[test]
    fn renders_value_set_fragment_with_quoting() {
        let condition = FieldCondition::value_set(
            field("packageid"),
            vec![Literal::integer("1"), Literal::integer("2")],
        );
        assert_eq!(render_condition(&condition), "packageid in ('1','2')");
    }

    #[test]
    fn discovery_query_parenthesizes_and_joins_fragments() {
        let a = FieldCondition::range(field("trainid"), Literal::integer("5"), Literal::integer("9"));
        let b = FieldCondition::value_set(field("packageid"), vec![Literal::integer("3")]);
        let query = build_discovery_query(&[&a, &b], "train_map");
        assert_eq!(
            query,
            "select serverip, serverport, shard_schema, shard_prefix from train_map \
             where (trainid between 5 and 9) and (packageid in ('3'))"
        );
    }

    #[test]
    fn discovery_query_without_conditions_omits_where() {
        let query = build_discovery_query(&[], "train_map");
        assert_eq!(
            query,
            "select serverip, serverport, shard_schema, shard_prefix from train_map"
        );
    }

    #[test]
    fn empty_value_set_is_not_rendered() {
        let empty = FieldCondition::value_set(field("trainid"), vec![]);
        let query = build_discovery_query(&[&empty], "train_map");
        assert!(!query.contains("where"));
    }

    #[test]
    fn routed_ports_must_be_in_range() {
        assert_eq!(port_from_i64(3306).expect("valid port"), 3306);
        assert!(port_from_i64(70000).is_err());
        assert!(port_from_i64(-1).is_err());
    }

    #[test]
    fn textual_ports_parse_strictly() {
        assert_eq!(port_from_text("3306").expect("valid port"), 3306);
        assert_eq!(port_from_text(" 3307 ").expect("trimmed"), 3307);
        assert!(port_from_text("db01").is_err());
        assert!(port_from_text("").is_err());
        assert!(port_from_text("70000").is_err());
    }

    #[test]
    fn build_plan_preserves_route_order() {
        let catalog = ShardCatalog::from_tables(["orders"]);
        let tables = vec![TableRef::new("shop", "orders")];
        let routes = vec![
            ShardRoute { host: "h1".into(), port: 3306, schema: "s1".into(), prefix: "p1_".into() },
            ShardRoute { host: "h2".into(), port: 3306, schema: "s2".into(), prefix: "p2_".into() },
        ];
        let plan = build_plan(
            "select * from orders where id=5",
            &tables,
            &catalog,
            routes,
            RewriteMode::Substring,
        );
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.shards[0].sql, "select * from s1.p1_orders where id=5");
        assert_eq!(plan.shards[1].sql, "select * from s2.p2_orders where id=5");
        assert_eq!(plan.shards[0].route.host, "h1");
        assert_eq!(plan.shards[1].route.host, "h2");
    }

    #[test]
    fn zero_routes_yield_empty_plan() {
        let catalog = ShardCatalog::from_tables(["orders"]);
        let tables = vec![TableRef::new("shop", "orders")];
        let plan = build_plan(
            "select * from orders",
            &tables,
            &catalog,
            Vec::new(),
            RewriteMode::Substring,
        );
        assert!(plan.is_empty());
    }
}
