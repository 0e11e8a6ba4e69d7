use crate::error::DataError;
use crate::memo::Memo;
use crate::value::{Fields, Value};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::ops::Index;
use std::sync::Arc;

/// Backing table of an entity family: its name and identity column.
///
/// The name may be schema-qualified (`inventory.widgets`).
///
/// # Example
///
/// ```ignore
/// let table = Table::new("widgets")?.with_id_column("widget_id")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    name: String,
    id_column: String,
}

impl Table {
    pub const DEFAULT_ID_COLUMN: &'static str = "id";

    /// # Errors
    ///
    /// `MisconfiguredEntity` if the name, or any part of a qualified name, is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, DataError> {
        let name = name.into();
        if name.trim().is_empty() || name.split('.').any(|part| part.trim().is_empty()) {
            return Err(DataError::MisconfiguredEntity(format!(
                "table name must be a non-empty string, got {name:?}"
            )));
        }
        Ok(Self {
            name,
            id_column: Self::DEFAULT_ID_COLUMN.to_string(),
        })
    }

    pub fn with_id_column(mut self, id_column: impl Into<String>) -> Result<Self, DataError> {
        let id_column = id_column.into();
        if id_column.trim().is_empty() {
            return Err(DataError::MisconfiguredEntity(format!(
                "id column of table '{}' must be a non-empty string",
                self.name
            )));
        }
        self.id_column = id_column;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }
}

/// One row of a table as an ordered, mutable mapping.
///
/// Reads go through [`get_field`](Entity::get_field) (mapping keys) and
/// [`member`](Entity::member) (declared members such as `table_name`).
/// Attribute-style writes through [`set`](Entity::set) only touch keys that
/// already exist; [`insert`](Entity::insert) is the dictionary-style write
/// that may add keys.
#[derive(Serialize, Deserialize)]
#[serde(try_from = "EntityState", into = "EntityState")]
pub struct Entity {
    table: Arc<Table>,
    fields: Fields,
    memo: Memo,
}

impl Entity {
    pub fn new(table: Arc<Table>) -> Self {
        Self::from_fields(table, Fields::new())
    }

    pub fn from_fields(table: Arc<Table>, fields: Fields) -> Self {
        Self {
            table,
            fields,
            memo: Memo::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn table_ref(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    pub fn id_column(&self) -> &str {
        self.table.id_column()
    }

    /// Rebind this entity to another table descriptor.
    pub fn set_table(&mut self, table: Arc<Table>) {
        self.table = table;
    }

    /// The identity value, if present and not null.
    pub fn id(&self) -> Option<&Value> {
        self.fields
            .get(self.table.id_column())
            .filter(|v| !v.is_null())
    }

    pub(crate) fn require_id(&self) -> Result<Value, DataError> {
        self.id().cloned().ok_or_else(|| DataError::MissingIdentity {
            table: self.table.name().to_string(),
            id_column: self.table.id_column().to_string(),
        })
    }

    /// Mapping key lookup.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Declared, non-data members.
    pub fn member(&self, name: &str) -> Option<Value> {
        match name {
            "table_name" => Some(Value::from(self.table.name())),
            "id_column" => Some(Value::from(self.table.id_column())),
            _ => None,
        }
    }

    /// Mapping key first, then declared member.
    ///
    /// Routine lookups need a session; see [`Model::lookup`](crate::Model::lookup).
    pub fn attribute(&self, name: &str) -> Result<Value, DataError> {
        self.get_field(name)
            .cloned()
            .or_else(|| self.member(name))
            .ok_or_else(|| DataError::UnknownAttribute(name.to_string()))
    }

    /// Attribute-style write: only existing keys can be assigned.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` for any name that is not already a key, including
    /// declared member names (use the typed setters for those).
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), DataError> {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(DataError::UnknownAttribute(name.to_string())),
        }
    }

    /// Dictionary-style write: adds the key if missing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name, value)
    }

    /// Apply [`set`](Entity::set) to every entry.
    ///
    /// Every key is checked before anything is written, so an unknown key
    /// leaves the entity untouched.
    pub fn update<K, V, I>(&mut self, fields: I) -> Result<(), DataError>
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let pending: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if let Some((unknown, _)) = pending.iter().find(|(k, _)| !self.fields.contains_key(k)) {
            return Err(DataError::UnknownAttribute(unknown.clone()));
        }
        for (k, v) in pending {
            self.fields.insert(k, v);
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Overwrite with columns returned by the database; local-only keys stay.
    pub(crate) fn absorb(&mut self, row: Fields) {
        for (k, v) in row {
            self.fields.insert(k, v);
        }
        self.memo.clear();
    }

    // -- memoization ------------------------------------------------------

    /// Compute `f` once per instance and return the stored result afterwards.
    ///
    /// ```ignore
    /// let label = widget.cached("label", |w| format!("{} ({})", w["name"], w["qty"]));
    /// ```
    pub fn cached<T, F>(&self, name: &'static str, f: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&Entity) -> T,
    {
        if let Some(hit) = self.memo.get::<T>(name) {
            return hit;
        }
        let value = f(self);
        self.memo.insert(name, value.clone());
        value
    }

    /// Async variant of [`cached`](Entity::cached), for values that need a query.
    pub async fn cached_async<T, F, Fut>(&self, name: &'static str, f: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&Entity) -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(hit) = self.memo.get::<T>(name) {
            return hit;
        }
        let value = f(self).await;
        self.memo.insert(name, value.clone());
        value
    }

    /// Like [`cached_async`](Entity::cached_async), but errors are returned and not stored.
    pub async fn try_cached_async<T, E, F, Fut>(&self, name: &'static str, f: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&Entity) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.memo.get::<T>(name) {
            return Ok(hit);
        }
        let value = f(self).await?;
        self.memo.insert(name, value.clone());
        Ok(value)
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.memo.contains(name)
    }

    pub fn invalidate_cache(&self) {
        self.memo.clear();
    }
}

/// A clone starts with an empty memo.
impl Clone for Entity {
    fn clone(&self) -> Self {
        Self::from_fields(self.table.clone(), self.fields.clone())
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.fields == other.fields
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.table.name())
            .field("fields", &self.fields)
            .finish()
    }
}

/// Panics if the key is absent, like `HashMap`'s `Index`.
impl Index<&str> for Entity {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        match self.fields.get(key) {
            Some(v) => v,
            None => panic!("no field '{key}' in entity of table '{}'", self.table.name()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EntityState {
    table: String,
    id_column: String,
    data: Fields,
}

impl From<Entity> for EntityState {
    fn from(entity: Entity) -> Self {
        EntityState {
            table: entity.table.name().to_string(),
            id_column: entity.table.id_column().to_string(),
            data: entity.fields,
        }
    }
}

impl TryFrom<EntityState> for Entity {
    type Error = DataError;

    fn try_from(state: EntityState) -> Result<Self, DataError> {
        let table = Table::new(state.table)?.with_id_column(state.id_column)?;
        Ok(Entity::from_fields(Arc::new(table), state.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn widget() -> Entity {
        let table = Arc::new(Table::new("widgets").unwrap());
        Entity::from_fields(table, fields! { "id" => 1, "name" => "a" })
    }

    #[test]
    fn test_table_requires_name() {
        assert!(matches!(
            Table::new(""),
            Err(DataError::MisconfiguredEntity(_))
        ));
        assert!(matches!(
            Table::new("inventory."),
            Err(DataError::MisconfiguredEntity(_))
        ));
        assert!(matches!(
            Table::new("widgets").unwrap().with_id_column(" "),
            Err(DataError::MisconfiguredEntity(_))
        ));
        assert_eq!(Table::new("widgets").unwrap().id_column(), "id");
    }

    #[test]
    fn test_id_ignores_null() {
        let mut w = widget();
        assert_eq!(w.id(), Some(&Value::Int(1)));
        w.set("id", Value::Null).unwrap();
        assert_eq!(w.id(), None);
        assert!(matches!(w.require_id(), Err(DataError::MissingIdentity { .. })));
    }

    #[test]
    fn test_resolution_order() {
        let mut w = widget();
        assert_eq!(w.attribute("name").unwrap(), Value::from("a"));
        assert_eq!(w.attribute("table_name").unwrap(), Value::from("widgets"));
        // a mapping key shadows the declared member
        w.insert("table_name", "shadow");
        assert_eq!(w.attribute("table_name").unwrap(), Value::from("shadow"));
        assert!(matches!(
            w.attribute("colour"),
            Err(DataError::UnknownAttribute(name)) if name == "colour"
        ));
    }

    #[test]
    fn test_set_rejects_unknown_keys() {
        let mut w = widget();
        w.set("name", "b").unwrap();
        assert_eq!(w["name"], Value::from("b"));
        assert!(matches!(
            w.set("colour", "red"),
            Err(DataError::UnknownAttribute(_))
        ));
        assert!(matches!(
            w.set("table_name", "gadgets"),
            Err(DataError::UnknownAttribute(_))
        ));
        assert!(!w.contains_key("colour"));
        assert_eq!(w.table_name(), "widgets");
    }

    #[test]
    fn test_insert_adds_keys() {
        let mut w = widget();
        assert_eq!(w.insert("colour", "red"), None);
        assert_eq!(w.get_field("colour"), Some(&Value::from("red")));
        w.set("colour", "blue").unwrap();
        assert_eq!(w["colour"], Value::from("blue"));
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut w = widget();
        let err = w
            .update(vec![("name", Value::from("b")), ("colour", Value::from("red"))])
            .unwrap_err();
        assert!(matches!(err, DataError::UnknownAttribute(name) if name == "colour"));
        assert_eq!(w["name"], Value::from("a"));

        w.update(fields! { "name" => "c" }).unwrap();
        assert_eq!(w["name"], Value::from("c"));
    }

    #[test]
    fn test_cached_computes_once() {
        let w = widget();
        let calls = AtomicUsize::new(0);
        let compute = |e: &Entity| {
            calls.fetch_add(1, Ordering::SeqCst);
            format!("widget #{}", e["id"])
        };
        assert_eq!(w.cached("label", compute), "widget #1");
        assert_eq!(w.cached("label", compute), "widget #1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(w.is_cached("label"));

        w.invalidate_cache();
        assert_eq!(w.cached("label", compute), "widget #1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clone_has_fresh_memo() {
        let w = widget();
        w.cached("label", |_| 1_u32);
        let copy = w.clone();
        assert!(!copy.is_cached("label"));
        assert_eq!(copy, w);
    }

    #[test]
    fn test_absorb_overwrites_and_clears_memo() {
        let mut w = widget();
        w.insert("scratch", true);
        w.cached("label", |_| 1_u32);
        w.absorb(fields! { "id" => 1, "name" => "server", "updated" => true });
        assert_eq!(w["name"], Value::from("server"));
        assert_eq!(w["updated"], Value::Bool(true));
        assert_eq!(w["scratch"], Value::Bool(true));
        assert!(!w.is_cached("label"));
    }

    #[test]
    fn test_serde_round_trip() {
        let table = Arc::new(Table::new("widgets").unwrap().with_id_column("wid").unwrap());
        let w = Entity::from_fields(table, fields! { "wid" => 9, "name" => "it's" });
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["table"], "widgets");
        assert_eq!(json["id_column"], "wid");
        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, w);
        assert_eq!(back.id(), Some(&Value::Int(9)));
    }

    #[test]
    fn test_deserialize_rejects_blank_table() {
        let json = serde_json::json!({ "table": "", "id_column": "id", "data": [] });
        assert!(serde_json::from_value::<Entity>(json).is_err());
    }

    #[tokio::test]
    async fn test_try_cached_async_skips_errors() {
        let w = widget();
        let failed: Result<i64, &str> = w.try_cached_async("count", |_| async { Err("down") }).await;
        assert!(failed.is_err());
        assert!(!w.is_cached("count"));
        let ok: Result<i64, &str> = w.try_cached_async("count", |_| async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));
        let again: Result<i64, &str> = w.try_cached_async("count", |_| async { Ok(99) }).await;
        assert_eq!(again, Ok(3));
    }
}
