//! Row-level condition expressions.
//!
//! A small, storage-agnostic expression tree. Evaluators build conditions
//! over named row variables; the query layer translates them into its own
//! language (SQL, an ORM criteria API, ...). `EXISTS` nodes introduce a new
//! row variable correlated with the enclosing ones.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::object::{AttrValue, AuthorizableType, ID_ATTRIBUTE};

/// Named row variable (table alias).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RowVar(String);

impl RowVar {
    pub const ROOT: &'static str = "root";

    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn attr(&self, name: impl Into<String>) -> Operand {
        Operand::Attribute {
            row: self.clone(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> Operand {
        self.attr(ID_ATTRIBUTE)
    }
}

impl core::fmt::Display for RowVar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Attribute { row: RowVar, name: String },
    Value(AttrValue),
}

impl Operand {
    pub fn value(value: impl Into<AttrValue>) -> Self {
        Operand::Value(value.into())
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operand::Attribute { row, name } => write!(f, "{row}.{name}"),
            Operand::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Boolean condition over row variables.
///
/// Only monotone connectives: a comparison with a NULL side is false, and
/// without negation that is also where SQL's UNKNOWN ends up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    True,
    False,
    Eq {
        left: Operand,
        right: Operand,
    },
    In {
        operand: Operand,
        values: Vec<AttrValue>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Exists {
        row: RowVar,
        object_type: AuthorizableType,
        condition: Box<Condition>,
    },
}

impl Condition {
    pub fn eq(left: Operand, right: Operand) -> Self {
        Condition::Eq { left, right }
    }

    pub fn is_in(operand: Operand, values: impl IntoIterator<Item = AttrValue>) -> Self {
        let values: Vec<AttrValue> = values.into_iter().collect();
        if values.is_empty() {
            return Condition::False;
        }
        Condition::In { operand, values }
    }

    /// Conjunction; `TRUE` operands are dropped, any `FALSE` wins, empty is `TRUE`.
    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut kept = Vec::new();
        for c in conditions {
            match c {
                Condition::True => {}
                Condition::False => return Condition::False,
                Condition::And(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Condition::True,
            1 => kept.remove(0),
            _ => Condition::And(kept),
        }
    }

    /// Disjunction; `FALSE` operands are dropped, any `TRUE` wins, empty is `FALSE`.
    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut kept = Vec::new();
        for c in conditions {
            match c {
                Condition::False => {}
                Condition::True => return Condition::True,
                Condition::Or(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Condition::False,
            1 => kept.remove(0),
            _ => Condition::Or(kept),
        }
    }

    pub fn exists(row: RowVar, object_type: AuthorizableType, condition: Condition) -> Self {
        if condition == Condition::False {
            return Condition::False;
        }
        Condition::Exists {
            row,
            object_type,
            condition: Box::new(condition),
        }
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Condition::False)
    }

    /// Row variables referenced but not bound inside this condition.
    pub fn free_vars(&self) -> BTreeSet<RowVar> {
        let mut free = BTreeSet::new();
        self.collect_free(&mut Vec::new(), &mut free);
        free
    }

    fn collect_free(&self, bound: &mut Vec<RowVar>, free: &mut BTreeSet<RowVar>) {
        fn visit(operand: &Operand, bound: &[RowVar], free: &mut BTreeSet<RowVar>) {
            if let Operand::Attribute { row, .. } = operand {
                if !bound.contains(row) {
                    free.insert(row.clone());
                }
            }
        }

        match self {
            Condition::True | Condition::False => {}
            Condition::Eq { left, right } => {
                visit(left, bound, free);
                visit(right, bound, free);
            }
            Condition::In { operand, .. } => visit(operand, bound, free),
            Condition::And(items) | Condition::Or(items) => {
                for c in items {
                    c.collect_free(bound, free);
                }
            }
            Condition::Exists { row, condition, .. } => {
                bound.push(row.clone());
                condition.collect_free(bound, free);
                bound.pop();
            }
        }
    }
}

impl core::fmt::Display for Condition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fn join(
            f: &mut core::fmt::Formatter<'_>,
            items: &[Condition],
            sep: &str,
        ) -> core::fmt::Result {
            f.write_str("(")?;
            for (idx, c) in items.iter().enumerate() {
                if idx > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{c}")?;
            }
            f.write_str(")")
        }

        match self {
            Condition::True => f.write_str("TRUE"),
            Condition::False => f.write_str("FALSE"),
            Condition::Eq { left, right } => write!(f, "{left} = {right}"),
            Condition::In { operand, values } => {
                write!(f, "{operand} IN (")?;
                for (idx, v) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
            Condition::And(items) => join(f, items, " AND "),
            Condition::Or(items) => join(f, items, " OR "),
            Condition::Exists {
                row,
                object_type,
                condition,
            } => write!(f, "EXISTS ({object_type} {row} WHERE {condition})"),
        }
    }
}

/// The row a filter is being built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    pub row: RowVar,
    pub object_type: AuthorizableType,
}

impl QueryContext {
    pub fn new(row: RowVar, object_type: AuthorizableType) -> Self {
        Self { row, object_type }
    }

    pub fn root(object_type: AuthorizableType) -> Self {
        Self::new(RowVar::root(), object_type)
    }
}

/// Allocates correlated row variables while a filter is composed.
///
/// One builder is shared by every evaluator contributing to a single
/// filter, so aliases never collide across nested sub-conditions.
#[derive(Debug, Default)]
pub struct ConditionBuilder {
    next: usize,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// New row variable named after `hint` (`rel_0`, `owner_1`, ...).
    pub fn fresh(&mut self, hint: &str) -> RowVar {
        let var = RowVar(format!("{hint}_{}", self.next));
        self.next += 1;
        var
    }

    /// `EXISTS (<object_type> v WHERE body(v))` with a fresh `v`.
    pub fn exists<E>(
        &mut self,
        hint: &str,
        object_type: AuthorizableType,
        body: impl FnOnce(&mut Self, &RowVar) -> Result<Condition, E>,
    ) -> Result<Condition, E> {
        let row = self.fresh(hint);
        let condition = body(self, &row)?;
        Ok(Condition::exists(row, object_type, condition))
    }
}
