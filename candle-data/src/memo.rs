use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

/// Per-instance memo of derived values, keyed by method name.
///
/// Stored values are type-erased; a lookup with a different type than the one
/// stored is a miss and the new value replaces the old one.
#[derive(Default)]
pub struct Memo {
    inner: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a memoized value if one of type `T` is stored under `name`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        let entry = self.inner.get(name)?;
        entry.value().downcast_ref::<T>().cloned()
    }

    pub fn insert<T: Send + Sync + 'static>(&self, name: &'static str, value: T) {
        self.inner.insert(name, Arc::new(value));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn remove(&self, name: &str) {
        self.inner.remove(name);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for Memo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.inner.iter().map(|e| *e.key()).collect();
        f.debug_struct("Memo").field("keys", &keys).finish()
    }
}
