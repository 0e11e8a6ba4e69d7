//! The CRUD and query protocol of an entity family.

use crate::commit::{self, WriteOptions};
use crate::connection::Connection;
use crate::entity::{Entity, Table};
use crate::error::DataError;
use crate::query::{self, Joiner};
use crate::routine::Routine;
use crate::session::Session;
use crate::value::{Fields, Value};
use std::sync::Arc;
use tracing::debug;

/// Result of resolving a name against an entity, in resolution order.
pub enum Lookup<'m, C: Connection> {
    /// A mapping key of the entity.
    Field(Value),
    /// A declared member (`table_name`, `id_column`).
    Member(Value),
    /// A stored routine found in the routine catalog.
    Routine(Routine<'m, C>),
}

impl<C: Connection> std::fmt::Debug for Lookup<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Field(v) => f.debug_tuple("Field").field(v).finish(),
            Lookup::Member(v) => f.debug_tuple("Member").field(v).finish(),
            Lookup::Routine(r) => f.debug_tuple("Routine").field(&r.name()).finish(),
        }
    }
}

/// A table bound to a session.
///
/// Issues the statements of the active-record protocol and wraps result rows
/// as [`Entity`] values of its table.
///
/// # Example
///
/// ```ignore
/// let widgets = Model::named("widgets", session.clone())?;
/// let mut w = widgets.insert(fields! { "name" => "a" }).await?;
/// w.set("name", "b")?;
/// widgets.save(&mut w).await?;
/// assert!(widgets.exists(&fields! { "name" => "b" }, Joiner::And).await?);
/// ```
pub struct Model<C: Connection> {
    table: Arc<Table>,
    session: Arc<Session<C>>,
}

impl<C: Connection> Model<C> {
    pub fn new(table: Table, session: Arc<Session<C>>) -> Self {
        Self {
            table: Arc::new(table),
            session,
        }
    }

    /// Model over `name` with the default `id` identity column.
    ///
    /// # Errors
    ///
    /// `MisconfiguredEntity` for a blank table name.
    pub fn named(name: impl Into<String>, session: Arc<Session<C>>) -> Result<Self, DataError> {
        Ok(Self::new(Table::new(name)?, session))
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn session(&self) -> &Arc<Session<C>> {
        &self.session
    }

    /// An unsaved entity of this model's table.
    pub fn entity(&self, fields: Fields) -> Entity {
        Entity::from_fields(self.table.clone(), fields)
    }

    fn wrap(&self, rows: Vec<Fields>) -> Vec<Entity> {
        rows.into_iter().map(|row| self.entity(row)).collect()
    }

    fn check_owner(&self, entity: &Entity) -> Result<(), DataError> {
        if entity.table() != self.table.as_ref() {
            return Err(DataError::MisconfiguredEntity(format!(
                "entity of table '{}' used with model of table '{}'",
                entity.table_name(),
                self.table.name()
            )));
        }
        Ok(())
    }

    // -- mutating operations ---------------------------------------------

    /// Insert a row and return it as the database stored it.
    pub async fn insert(&self, fields: Fields) -> Result<Entity, DataError> {
        self.insert_with(fields, WriteOptions::default()).await
    }

    pub async fn insert_with(&self, fields: Fields, opts: WriteOptions) -> Result<Entity, DataError> {
        let stmt = query::insert(&self.table, &fields);
        let mut cursor = self.session.cursor().await?;
        let row = cursor.fetch_optional(&stmt).await?.ok_or_else(|| {
            DataError::Decode(format!("INSERT into '{}' returned no row", self.table.name()))
        })?;
        commit::finish(&mut cursor, opts).await?;
        Ok(self.entity(row))
    }

    /// Write every field of `entity` back to its row.
    ///
    /// Columns returned by the database overwrite the entity, and its memo is
    /// cleared.
    ///
    /// # Errors
    ///
    /// `MissingIdentity` without an id; `NotFound` when no row has that id
    /// (nothing is committed then).
    pub async fn save(&self, entity: &mut Entity) -> Result<(), DataError> {
        self.save_with(entity, WriteOptions::default()).await
    }

    pub async fn save_with(&self, entity: &mut Entity, opts: WriteOptions) -> Result<(), DataError> {
        self.check_owner(entity)?;
        let id = entity.require_id()?;
        let stmt = query::update(&self.table, entity.fields(), &id);
        let mut cursor = self.session.cursor().await?;
        let row = cursor.fetch_optional(&stmt).await?.ok_or_else(|| {
            DataError::NotFound(format!("{} with {} = {id}", self.table.name(), self.table.id_column()))
        })?;
        commit::finish(&mut cursor, opts).await?;
        entity.absorb(row);
        Ok(())
    }

    /// Delete the entity's row. Its fields stay in memory; the memo is cleared.
    ///
    /// Returns whether a row was deleted.
    pub async fn delete(&self, entity: &mut Entity) -> Result<bool, DataError> {
        self.delete_with(entity, WriteOptions::default()).await
    }

    pub async fn delete_with(&self, entity: &mut Entity, opts: WriteOptions) -> Result<bool, DataError> {
        self.check_owner(entity)?;
        let id = entity.require_id()?;
        let stmt = query::delete(&self.table, &id);
        let mut cursor = self.session.cursor().await?;
        let affected = cursor.execute(&stmt).await?;
        commit::finish(&mut cursor, opts).await?;
        entity.invalidate_cache();
        Ok(affected > 0)
    }

    // -- reads -------------------------------------------------------------

    /// Point lookup by id; `None` when no row matches.
    pub async fn get(&self, id: impl Into<Value>) -> Result<Option<Entity>, DataError> {
        let stmt = query::select_by_id(&self.table, &id.into());
        let mut cursor = self.session.cursor().await?;
        Ok(cursor.fetch_optional(&stmt).await?.map(|row| self.entity(row)))
    }

    /// Rows whose id is any of `ids`, in database order.
    ///
    /// An empty `ids` returns an empty list without touching the database.
    pub async fn get_many<I, V>(&self, ids: I) -> Result<Vec<Entity>, DataError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        let Some(stmt) = query::select_many(&self.table, &ids) else {
            debug!(table = self.table.name(), "get_many with no ids");
            return Ok(Vec::new());
        };
        let mut cursor = self.session.cursor().await?;
        Ok(self.wrap(cursor.fetch_all(&stmt).await?))
    }

    pub async fn get_all(&self) -> Result<Vec<Entity>, DataError> {
        let stmt = query::select_all(&self.table);
        let mut cursor = self.session.cursor().await?;
        Ok(self.wrap(cursor.fetch_all(&stmt).await?))
    }

    /// Rows matching `column = value` conditions combined with `joiner`.
    ///
    /// A null value matches with `IS NULL`; no conditions match every row.
    pub async fn find_where(&self, conditions: &Fields, joiner: Joiner) -> Result<Vec<Entity>, DataError> {
        let stmt = query::select_where(&self.table, conditions, joiner);
        let mut cursor = self.session.cursor().await?;
        Ok(self.wrap(cursor.fetch_all(&stmt).await?))
    }

    /// Whether [`find_where`](Model::find_where) would return any row.
    pub async fn exists(&self, conditions: &Fields, joiner: Joiner) -> Result<bool, DataError> {
        let stmt = query::exists(&self.table, conditions, joiner);
        let mut cursor = self.session.cursor().await?;
        let row = cursor.fetch_optional(&stmt).await?;
        read_exists(row)
    }

    /// Column names of the table, in declaration order.
    pub async fn fields(&self) -> Result<Vec<String>, DataError> {
        let stmt = query::column_catalog(&self.table);
        let mut cursor = self.session.cursor().await?;
        cursor
            .fetch_all(&stmt)
            .await?
            .into_iter()
            .map(|row| match row.get("column_name") {
                Some(Value::Text(name)) => Ok(name.clone()),
                other => Err(DataError::Decode(format!(
                    "column catalog returned {other:?} for column_name"
                ))),
            })
            .collect()
    }

    /// Reload the entity's row, overwriting its fields.
    ///
    /// # Errors
    ///
    /// `MissingIdentity` without an id; `NotFound` if the row is gone.
    pub async fn refresh(&self, entity: &mut Entity) -> Result<(), DataError> {
        self.check_owner(entity)?;
        let id = entity.require_id()?;
        let stmt = query::select_by_id(&self.table, &id);
        let mut cursor = self.session.cursor().await?;
        let row = cursor.fetch_optional(&stmt).await?.ok_or_else(|| {
            DataError::NotFound(format!("{} with {} = {id}", self.table.name(), self.table.id_column()))
        })?;
        entity.absorb(row);
        Ok(())
    }

    // -- routines ----------------------------------------------------------

    /// Resolve `name` against `entity`: mapping key, declared member, then
    /// the routine catalog.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` when all three miss.
    pub async fn lookup(&self, entity: &Entity, name: &str) -> Result<Lookup<'_, C>, DataError> {
        if let Some(value) = entity.get_field(name) {
            return Ok(Lookup::Field(value.clone()));
        }
        if let Some(value) = entity.member(name) {
            return Ok(Lookup::Member(value));
        }
        self.routine(name).await.map(Lookup::Routine)
    }

    /// A handle on the stored routine `name`.
    ///
    /// Existence is checked against the routine catalog once per session and
    /// name; later calls are answered from the session's registry.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` if no such routine exists.
    pub async fn routine(&self, name: &str) -> Result<Routine<'_, C>, DataError> {
        let registry = self.session.routines();
        if !registry.contains(name) {
            let stmt = query::routine_catalog(name);
            let found = {
                let mut cursor = self.session.cursor().await?;
                read_exists(cursor.fetch_optional(&stmt).await?)?
            };
            if !found {
                return Err(DataError::UnknownAttribute(name.to_string()));
            }
            debug!(routine = name, "routine found in catalog");
            registry.remember(name);
        }
        Ok(Routine::new(self, name.to_string()))
    }

    /// Look up and call a stored routine in one step.
    pub async fn invoke_routine(&self, name: &str, args: &[Value]) -> Result<Vec<Entity>, DataError> {
        self.routine(name).await?.call(args).await
    }

    pub(crate) async fn call_routine(&self, name: &str, args: &[Value]) -> Result<Vec<Entity>, DataError> {
        let stmt = query::call_routine(name, args);
        let mut cursor = self.session.cursor().await?;
        Ok(self.wrap(cursor.fetch_all(&stmt).await?))
    }
}

impl<C: Connection> Clone for Model<C> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            session: self.session.clone(),
        }
    }
}

fn read_exists(row: Option<Fields>) -> Result<bool, DataError> {
    match row.as_ref().and_then(|r| r.get("exists")) {
        Some(Value::Bool(b)) => Ok(*b),
        other => Err(DataError::Decode(format!(
            "expected a boolean \"exists\" column, got {other:?}"
        ))),
    }
}
