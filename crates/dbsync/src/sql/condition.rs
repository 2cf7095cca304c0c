//! Offset conditions for keyset pagination over composite keys.
//!
//! For key fields `[f0, f1, f2]` and an offset `(v0, v1, v2)` the
//! greater-than condition is the lexicographic tuple comparison
//!
//! ```text
//! f0 > v0 OR f0 = v0 AND (f1 > v1 OR f1 = v1 AND (f2 > v2))
//! ```
//!
//! and the lower-or-equal condition mirrors it with `<` and a final `<=`.
//! Each key field binds one named parameter `p<level>`; the builder returns
//! the next free level so two conditions can share one query without
//! colliding parameter names.
//!
//! The expression is assembled from the innermost field outwards, so very
//! wide keys do not recurse.

use std::cmp::Ordering;

use crate::core::key::{KeyTuple, KeyValue};
use crate::error::{Result, SyncError};

/// Comparison operator of a single key-field term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Lt,
    Le,
    Eq,
}

impl CmpOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "=",
        }
    }

    fn holds(&self, ord: Ordering) -> bool {
        match self {
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Eq => ord == Ordering::Equal,
        }
    }
}

/// Boolean expression over key fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// No bound.
    True,
    Cmp {
        field: String,
        op: CmpOp,
        param: String,
        value: KeyValue,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Conjunction that drops `True` operands.
    pub fn and(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::True, c) | (c, Condition::True) => c,
            (a, b) => Condition::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Condition::True)
    }

    /// Render as SQL with `:name` placeholders. `quote` quotes field names.
    pub fn to_sql(&self, quote: &dyn Fn(&str) -> String) -> String {
        match self {
            Condition::True => "1=1".to_string(),
            Condition::Cmp {
                field, op, param, ..
            } => format!("{} {} :{}", quote(field), op.as_sql(), param),
            Condition::Or(l, r) => format!("{} OR {}", l.to_sql(quote), r.to_sql(quote)),
            Condition::And(l, r) => {
                let left = match l.as_ref() {
                    Condition::Or(..) => format!("({})", l.to_sql(quote)),
                    _ => l.to_sql(quote),
                };
                format!("{} AND ({})", left, r.to_sql(quote))
            }
        }
    }

    /// Bound parameters, one entry per distinct name, in first-use order.
    pub fn params(&self) -> Vec<(String, KeyValue)> {
        let mut out: Vec<(String, KeyValue)> = Vec::new();
        self.collect_params(&mut out);
        out
    }

    fn collect_params(&self, out: &mut Vec<(String, KeyValue)>) {
        match self {
            Condition::True => {}
            Condition::Cmp { param, value, .. } => {
                if !out.iter().any(|(p, _)| p == param) {
                    out.push((param.clone(), value.clone()));
                }
            }
            Condition::And(l, r) | Condition::Or(l, r) => {
                l.collect_params(out);
                r.collect_params(out);
            }
        }
    }

    /// Evaluate against a key tuple. Terms on fields the tuple lacks are false.
    pub fn eval(&self, key: &KeyTuple) -> bool {
        match self {
            Condition::True => true,
            Condition::Cmp {
                field, op, value, ..
            } => key
                .get(field)
                .map(|v| op.holds(v.cmp(value)))
                .unwrap_or(false),
            Condition::And(l, r) => l.eval(key) && r.eval(key),
            Condition::Or(l, r) => l.eval(key) || r.eval(key),
        }
    }
}

/// A condition plus the first parameter level it did not use.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCondition {
    pub condition: Condition,
    pub next_level: usize,
}

/// Builds lexicographic offset conditions for ordered key fields.
pub struct OffsetConditionBuilder;

impl OffsetConditionBuilder {
    /// `(key fields) > offset`.
    pub fn greater_than(
        key_fields: &[String],
        offset: &KeyTuple,
        level: usize,
    ) -> Result<BuiltCondition> {
        Self::build(key_fields, offset, level, CmpOp::Gt, CmpOp::Gt)
    }

    /// `(key fields) <= offset`.
    pub fn lower_or_equal_than(
        key_fields: &[String],
        offset: &KeyTuple,
        level: usize,
    ) -> Result<BuiltCondition> {
        Self::build(key_fields, offset, level, CmpOp::Lt, CmpOp::Le)
    }

    fn build(
        key_fields: &[String],
        offset: &KeyTuple,
        level: usize,
        strict: CmpOp,
        last: CmpOp,
    ) -> Result<BuiltCondition> {
        let next_level = level + key_fields.len();
        let mut terms = Vec::with_capacity(key_fields.len());
        for (i, field) in key_fields.iter().enumerate() {
            let value = offset.get(field).cloned().ok_or_else(|| {
                SyncError::Config(format!("offset has no value for key field '{}'", field))
            })?;
            terms.push((field.clone(), format!("p{}", level + i), value));
        }

        let mut condition: Option<Condition> = None;
        for (field, param, value) in terms.into_iter().rev() {
            let term = |op: CmpOp| Condition::Cmp {
                field: field.clone(),
                op,
                param: param.clone(),
                value: value.clone(),
            };
            condition = Some(match condition {
                None => term(last),
                Some(inner) => Condition::Or(
                    Box::new(term(strict)),
                    Box::new(Condition::And(Box::new(term(CmpOp::Eq)), Box::new(inner))),
                ),
            });
        }

        Ok(BuiltCondition {
            condition: condition.unwrap_or(Condition::True),
            next_level,
        })
    }
}

/// Condition for the half-open-to-closed window `(lower, upper]`.
/// Missing bounds are open. Returns the next free parameter level.
pub fn range_condition(
    key_fields: &[String],
    lower: Option<&KeyTuple>,
    upper: Option<&KeyTuple>,
    level: usize,
) -> Result<BuiltCondition> {
    let mut condition = Condition::True;
    let mut level = level;
    if let Some(lower) = lower {
        let built = OffsetConditionBuilder::greater_than(key_fields, lower, level)?;
        condition = condition.and(built.condition);
        level = built.next_level;
    }
    if let Some(upper) = upper {
        let built = OffsetConditionBuilder::lower_or_equal_than(key_fields, upper, level)?;
        condition = condition.and(built.condition);
        level = built.next_level;
    }
    Ok(BuiltCondition {
        condition,
        next_level: level,
    })
}
