//! Core data model for the routing pipeline.
//!
//! Conditions (`FieldCondition`) and routes (`ShardRoute`) live for one
//! statement's resolution and are discarded once the shard plan is built;
//! `ConnectionParams` describe the long-lived configured instances.

use serde::{Deserialize, Serialize};

/// Kind tag carried by every literal pulled out of the predicate tree.
///
/// Only `Integer` participates in range widening during merging; everything
/// else is compared and rendered as opaque text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    Integer,
    Text,
    Other,
}

/// A literal operand: its source text plus a kind tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub text: String,
    pub kind: LiteralKind,
}

impl Literal {
    pub fn integer(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: LiteralKind::Integer }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: LiteralKind::Text }
    }

    pub fn other(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: LiteralKind::Other }
    }

    /// Base-10 value for integer-kind bounds; `None` when the literal is not
    /// integer-kind or its text does not parse.
    pub fn as_i64(&self) -> Option<i64> {
        if self.kind != LiteralKind::Integer {
            return None;
        }
        self.text.trim().parse::<i64>().ok()
    }
}

/// A column reference resolved against the statement's table list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldReference {
    pub schema: String,
    pub table: String,
    pub alias: String,
    pub alias_used: bool,
    pub column: String,
}

impl FieldReference {
    /// Merge identity: exact string equality on (schema, table, alias,
    /// column). `alias_used` is carried for rewriting but is not identity.
    pub fn same_identity(&self, other: &FieldReference) -> bool {
        self.schema == other.schema
            && self.table == other.table
            && self.alias == other.alias
            && self.column == other.column
    }
}

/// The payload of a condition. A condition is exactly one of the two kinds
/// and never changes kind after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKind {
    /// Bounded range, from a BETWEEN predicate.
    Range { min: Literal, max: Literal },
    /// Discrete values, from comparisons and IN lists. Insertion order is
    /// preserved; duplicates are removed by exact text match.
    ValueSet { values: Vec<Literal> },
}

/// One column-scoped filter extracted from the WHERE predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCondition {
    pub field: FieldReference,
    pub kind: ConditionKind,
}

impl FieldCondition {
    pub fn value_set(field: FieldReference, values: Vec<Literal>) -> Self {
        Self { field, kind: ConditionKind::ValueSet { values } }
    }

    pub fn range(field: FieldReference, min: Literal, max: Literal) -> Self {
        Self { field, kind: ConditionKind::Range { min, max } }
    }
}

/// One entry of the statement's flattened table list, as handed in by the
/// host engine alongside the predicate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
    pub alias: String,
    pub alias_used: bool,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            schema: schema.into(),
            alias: name.clone(),
            name,
            alias_used: false,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self.alias_used = true;
        self
    }
}

/// Connection parameters for one configured shard instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub schema: String,
    /// Physical table-name prefix used on this instance.
    pub table_prefix: String,
}

/// One row returned by shard discovery: where a matching shard lives and how
/// its physical tables are named. Created per statement, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRoute {
    pub host: String,
    pub port: u16,
    pub schema: String,
    pub prefix: String,
}

/// Column metadata attached to a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// One shard's result set, already converted to the textual boundary format.
/// `None` in a cell is the null marker the host maps to SQL NULL.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
