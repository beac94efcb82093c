//! In-memory object store and reference condition executor.
//!
//! Intended for tests/dev and local tooling. A production deployment
//! translates [`Condition`]s into its own query language instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use idgov_core::ObjectId;

use crate::condition::{Condition, Operand, QueryContext, RowVar};
use crate::error::CollaboratorError;
use crate::lookup::ObjectLookup;
use crate::object::{AttrValue, AuthorizableType, Record};

type Tables = HashMap<AuthorizableType, BTreeMap<ObjectId, Record>>;

#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    tables: RwLock<Tables>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Record) -> Result<(), CollaboratorError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| CollaboratorError::Poisoned("data source"))?;
        tables
            .entry(record.object_type.clone())
            .or_default()
            .insert(record.id, record);
        Ok(())
    }

    pub fn remove(
        &self,
        object_type: &AuthorizableType,
        id: ObjectId,
    ) -> Result<Option<Record>, CollaboratorError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| CollaboratorError::Poisoned("data source"))?;
        Ok(tables.get_mut(object_type).and_then(|t| t.remove(&id)))
    }

    /// Every row of the query's type for which `condition` holds.
    pub fn select(
        &self,
        query: &QueryContext,
        condition: &Condition,
    ) -> Result<Vec<Record>, CollaboratorError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| CollaboratorError::Poisoned("data source"))?;
        let Some(table) = tables.get(&query.object_type) else {
            return Ok(Vec::new());
        };
        Ok(table
            .values()
            .filter(|row| {
                let mut scope = vec![(&query.row, *row)];
                eval(&tables, &mut scope, condition)
            })
            .cloned()
            .collect())
    }

    /// Whether `condition` holds with the query's row bound to `record`.
    pub fn matches(
        &self,
        query: &QueryContext,
        record: &Record,
        condition: &Condition,
    ) -> Result<bool, CollaboratorError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| CollaboratorError::Poisoned("data source"))?;
        let mut scope = vec![(&query.row, record)];
        Ok(eval(&tables, &mut scope, condition))
    }
}

fn resolve(scope: &[(&RowVar, &Record)], operand: &Operand) -> AttrValue {
    match operand {
        Operand::Value(v) => v.clone(),
        Operand::Attribute { row, name } => scope
            .iter()
            .rev()
            .find(|(var, _)| *var == row)
            .map(|(_, record)| record.attribute(name))
            .unwrap_or_default(),
    }
}

fn eval<'a>(
    tables: &'a Tables,
    scope: &mut Vec<(&'a RowVar, &'a Record)>,
    condition: &'a Condition,
) -> bool {
    match condition {
        Condition::True => true,
        Condition::False => false,
        Condition::Eq { left, right } => resolve(scope, left).sql_eq(&resolve(scope, right)),
        Condition::In { operand, values } => {
            let value = resolve(scope, operand);
            values.iter().any(|v| v.sql_eq(&value))
        }
        Condition::And(items) => items.iter().all(|c| eval(tables, scope, c)),
        Condition::Or(items) => items.iter().any(|c| eval(tables, scope, c)),
        Condition::Exists {
            row,
            object_type,
            condition,
        } => {
            let Some(table) = tables.get(object_type) else {
                return false;
            };
            table.values().any(|candidate| {
                scope.push((row, candidate));
                let hit = eval(tables, scope, condition);
                scope.pop();
                hit
            })
        }
    }
}

impl ObjectLookup for InMemoryDataSource {
    fn find(
        &self,
        object_type: &AuthorizableType,
        id: ObjectId,
    ) -> Result<Option<Record>, CollaboratorError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| CollaboratorError::Poisoned("data source"))?;
        Ok(tables.get(object_type).and_then(|t| t.get(&id)).cloned())
    }

    fn find_by_attribute(
        &self,
        object_type: &AuthorizableType,
        attribute: &str,
        value: &AttrValue,
    ) -> Result<Vec<Record>, CollaboratorError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| CollaboratorError::Poisoned("data source"))?;
        Ok(tables
            .get(object_type)
            .map(|t| {
                t.values()
                    .filter(|r| r.attribute(attribute).sql_eq(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
