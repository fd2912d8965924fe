//! Condition extraction from a parsed WHERE predicate.
//!
//! The host hands in a borrowed `sqlparser` expression tree plus the
//! statement's flattened table list; extraction walks the tree and produces
//! raw per-column conditions. Predicate shapes that don't match a supported
//! pattern are dropped silently (logged at debug) — extraction is
//! best-effort by contract, never an error path.
//!
//! Compound nodes are flattened according to [`DisjunctionPolicy`]: the
//! default `Flatten` mode treats AND and OR identically, which over-constrains
//! routing for OR predicates. See the policy docs before changing it.

use sqlparser::ast::{BinaryOperator, Expr, ObjectName, ObjectNamePart, UnaryOperator, Value};
use tracing::debug;

use crate::config::DisjunctionPolicy;
use crate::types::{FieldCondition, FieldReference, Literal, TableRef};

/// Walks a predicate tree into raw field conditions.
pub struct ConditionExtractor<'a> {
    tables: &'a [TableRef],
    policy: DisjunctionPolicy,
}

impl<'a> ConditionExtractor<'a> {
    pub fn new(tables: &'a [TableRef], policy: DisjunctionPolicy) -> Self {
        Self { tables, policy }
    }

    /// Extracts every condition reachable from `predicate`, in tree order.
    pub fn extract(&self, predicate: &Expr) -> Vec<FieldCondition> {
        let mut conditions = Vec::new();
        self.walk(predicate, &mut conditions);
        conditions
    }

    fn walk(&self, expr: &Expr, out: &mut Vec<FieldCondition>) {
        match expr {
            Expr::BinaryOp { op: BinaryOperator::And, left, right } => {
                self.walk(left, out);
                self.walk(right, out);
            }
            Expr::BinaryOp { op: BinaryOperator::Or, left, right } => match self.policy {
                DisjunctionPolicy::Flatten => {
                    self.walk(left, out);
                    self.walk(right, out);
                }
                DisjunctionPolicy::ConjunctionOnly => {
                    debug!("skipping OR subtree under ConjunctionOnly policy");
                }
            },
            Expr::Nested(inner) => self.walk(inner, out),
            leaf => {
                if let Some(condition) = self.classify(leaf) {
                    out.push(condition);
                }
            }
        }
    }

    /// Classifies a non-compound node by operator. Returns `None` for every
    /// unsupported or malformed shape (ExtractionSkip).
    fn classify(&self, expr: &Expr) -> Option<FieldCondition> {
        match expr {
            Expr::BinaryOp { op, left, right } if is_comparison(op) => {
                self.binary_comparison(left, right)
            }
            Expr::Like { negated: false, expr, pattern, .. } => {
                self.binary_comparison(expr, pattern)
            }
            Expr::Between { negated: false, expr, low, high } => self.between(expr, low, high),
            Expr::InList { negated: false, expr, list } => self.in_list(expr, list),
            Expr::MatchAgainst { columns, match_value, .. } => {
                self.match_against(columns, match_value)
            }
            Expr::UnaryOp { op: UnaryOperator::Not, .. } => None,
            _ => None,
        }
    }

    /// Binary comparison: exactly one operand must be a field reference.
    fn binary_comparison(&self, left: &Expr, right: &Expr) -> Option<FieldCondition> {
        match (self.field_ref(left), self.field_ref(right)) {
            (Some(field), None) => {
                Some(FieldCondition::value_set(field, vec![literal_from(right)]))
            }
            (None, Some(field)) => {
                Some(FieldCondition::value_set(field, vec![literal_from(left)]))
            }
            _ => {
                debug!("comparison without exactly one field operand dropped");
                None
            }
        }
    }

    /// BETWEEN: the first operand must be a field reference.
    fn between(&self, probe: &Expr, low: &Expr, high: &Expr) -> Option<FieldCondition> {
        let Some(field) = self.field_ref(probe) else {
            debug!("between with non-field first operand dropped");
            return None;
        };
        Some(FieldCondition::range(field, literal_from(low), literal_from(high)))
    }

    /// IN list: scan the argument chain in order, collecting literals until
    /// the first field-typed item, which binds the condition and terminates
    /// the scan. Items after the field are never inspected.
    fn in_list(&self, probe: &Expr, list: &[Expr]) -> Option<FieldCondition> {
        let mut values: Vec<Literal> = Vec::new();
        for item in list.iter().chain(std::iter::once(probe)) {
            if let Some(field) = self.field_ref(item) {
                return Some(FieldCondition::value_set(field, values));
            }
            values.push(literal_from(item));
        }
        debug!("in-list without a field operand dropped");
        None
    }

    /// MATCH ... AGAINST with a single column behaves like a binary
    /// comparison between that column and the search value.
    fn match_against(&self, columns: &[ObjectName], value: &Value) -> Option<FieldCondition> {
        if columns.len() != 1 {
            debug!("match-against with {} columns dropped", columns.len());
            return None;
        }
        let parts: Vec<String> = columns[0].0.iter().map(part_value).collect();
        let (qualifier, column) = match parts.as_slice() {
            [column] => (None, column.as_str()),
            [.., qualifier, column] => (Some(qualifier.as_str()), column.as_str()),
            [] => return None,
        };
        let field = self.resolve(qualifier, column)?;
        Some(FieldCondition::value_set(field, vec![literal_from_value(value)]))
    }

    /// Field-ness test and resolution in one step: identifiers are fields,
    /// everything else is not.
    fn field_ref(&self, expr: &Expr) -> Option<FieldReference> {
        match expr {
            Expr::Identifier(ident) => self.resolve(None, &ident.value),
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let column = &parts[parts.len() - 1].value;
                let qualifier = &parts[parts.len() - 2].value;
                self.resolve(Some(qualifier), column)
            }
            _ => None,
        }
    }

    /// Resolves a column against the statement's table list: a qualifier
    /// matches the table alias first, then the table name; unqualified
    /// columns bind to the sole listed table. An unqualified column with
    /// several tables listed is ambiguous and resolves to nothing.
    fn resolve(&self, qualifier: Option<&str>, column: &str) -> Option<FieldReference> {
        let table = match qualifier {
            Some(q) => self
                .tables
                .iter()
                .find(|t| (t.alias_used && t.alias == q) || t.name == q),
            None => {
                if self.tables.len() > 1 {
                    debug!(column, "unqualified column ambiguous across tables, dropped");
                    return None;
                }
                self.tables.first()
            }
        };
        Some(match table {
            Some(t) => FieldReference {
                schema: t.schema.clone(),
                table: t.name.clone(),
                alias: t.alias.clone(),
                alias_used: t.alias_used,
                column: column.to_string(),
            },
            None => FieldReference {
                table: qualifier.unwrap_or_default().to_string(),
                alias: qualifier.unwrap_or_default().to_string(),
                column: column.to_string(),
                ..FieldReference::default()
            },
        })
    }
}

fn is_comparison(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::Spaceship
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
    )
}

fn part_value(part: &ObjectNamePart) -> String {
    match part {
        ObjectNamePart::Identifier(ident) => ident.value.clone(),
        _ => String::new(),
    }
}

/// Converts a non-field operand into a literal, tagging its kind.
fn literal_from(expr: &Expr) -> Literal {
    match expr {
        Expr::Value(v) => literal_from_value(&v.value),
        // Negative numeric literals parse as unary minus over a number.
        Expr::UnaryOp { op: UnaryOperator::Minus, expr: inner } => {
            if let Expr::Value(v) = inner.as_ref() {
                if let Value::Number(n, _) = &v.value {
                    let text = format!("-{n}");
                    return if text.parse::<i64>().is_ok() {
                        Literal::integer(text)
                    } else {
                        Literal::other(text)
                    };
                }
            }
            Literal::other(expr.to_string())
        }
        other => Literal::other(other.to_string()),
    }
}

fn literal_from_value(value: &Value) -> Literal {
    match value {
        Value::Number(n, _) => {
            if n.parse::<i64>().is_ok() {
                Literal::integer(n.clone())
            } else {
                Literal::other(n.clone())
            }
        }
        Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Literal::text(s.clone()),
        other => Literal::other(other.to_string()),
    }
}
