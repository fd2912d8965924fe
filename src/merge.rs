//! Condition merging and deduplication.
//!
//! Collapses the raw extraction output into one canonical condition per
//! field identity, preserving first-occurrence order. A condition's kind
//! never changes here, and a `Range` is never merged with a `ValueSet`.

use tracing::debug;

use crate::types::{ConditionKind, FieldCondition, Literal, LiteralKind};

/// Merges raw conditions into a deduplicated sequence.
///
/// For each incoming condition the existing entries are scanned linearly for
/// an equal field identity; the first occurrence is cloned in, later ones
/// fold into it:
/// - `Range` + `Range`: integer-kind bounds widen outward; any bound that is
///   not integer-kind (or fails base-10 parsing) is left unmerged.
/// - `ValueSet` + `ValueSet`: unseen value texts append in order.
/// - Mixed kinds: no-op.
pub fn merge_conditions(raw: &[FieldCondition]) -> Vec<FieldCondition> {
    let mut merged: Vec<FieldCondition> = Vec::new();
    for condition in raw {
        match merged
            .iter_mut()
            .find(|existing| existing.field.same_identity(&condition.field))
        {
            Some(existing) => merge_into(existing, condition),
            None => merged.push(condition.clone()),
        }
    }
    merged
}

fn merge_into(existing: &mut FieldCondition, incoming: &FieldCondition) {
    match (&mut existing.kind, &incoming.kind) {
        (
            ConditionKind::Range { min: existing_min, max: existing_max },
            ConditionKind::Range { min: incoming_min, max: incoming_max },
        ) => {
            widen_bound(existing_max, incoming_max, Bound::Max);
            widen_bound(existing_min, incoming_min, Bound::Min);
        }
        (
            ConditionKind::ValueSet { values: existing_values },
            ConditionKind::ValueSet { values: incoming_values },
        ) => {
            for value in incoming_values {
                let seen = existing_values.iter().any(|v| v.text == value.text);
                if !seen {
                    existing_values.push(value.clone());
                }
            }
        }
        _ => {
            debug!(
                column = %incoming.field.column,
                "range/value-set kind mismatch, condition left unmerged"
            );
        }
    }
}

enum Bound {
    Min,
    Max,
}

/// Widens one range bound outward when the incoming bound is integer-kind
/// and both sides parse base-10; otherwise the existing bound is retained.
fn widen_bound(existing: &mut Literal, incoming: &Literal, bound: Bound) {
    if incoming.kind != LiteralKind::Integer {
        return;
    }
    let (Some(incoming_value), Some(existing_value)) = (incoming.as_i64(), existing.as_i64())
    else {
        debug!(text = %incoming.text, "unparseable integer bound left unmerged");
        return;
    };
    let widens = match bound {
        Bound::Max => incoming_value > existing_value,
        Bound::Min => incoming_value < existing_value,
    };
    if widens {
        *existing = Literal::integer(incoming_value.to_string());
    }
}
