//! Stored routines discovered through the routine catalog.

use crate::connection::Connection;
use crate::entity::Entity;
use crate::error::DataError;
use crate::model::Model;
use crate::value::Value;
use dashmap::DashSet;

/// Routine names confirmed to exist, shared by every model of a session.
///
/// Only hits are remembered: a name that was missing is looked up again on
/// the next request, so routines created later are still found.
#[derive(Debug, Default)]
pub struct RoutineRegistry {
    known: DashSet<String>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn remember(&self, name: &str) {
        self.known.insert(name.to_string());
    }

    /// Drop a name, e.g. after the routine was dropped server-side.
    pub fn forget(&self, name: &str) {
        self.known.remove(name);
    }

    pub fn clear(&self) {
        self.known.clear();
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// A stored routine bound to the model whose entities it returns.
pub struct Routine<'m, C: Connection> {
    model: &'m Model<C>,
    name: String,
}

impl<'m, C: Connection> Routine<'m, C> {
    pub(crate) fn new(model: &'m Model<C>, name: String) -> Self {
        Self { model, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `SELECT * FROM "name"(args...)`, one entity per result row.
    pub async fn call(&self, args: &[Value]) -> Result<Vec<Entity>, DataError> {
        self.model.call_routine(&self.name, args).await
    }
}

impl<C: Connection> std::fmt::Debug for Routine<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.name)
            .field("table", &self.model.table().name())
            .finish()
    }
}
