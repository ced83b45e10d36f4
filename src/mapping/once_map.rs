#![forbid(unsafe_code)]
use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, PoisonError, RwLock},
};

////////////////////////////////////////////////////////////////////////////////

/// Concurrent compute-if-absent map.
///
/// At most one initializer runs to completion per key; concurrent callers for
/// the same key block on the cell and observe the published value. A failed
/// initializer leaves the key empty so a later call can retry.
pub(crate) struct OnceMap<K, V> {
    cells: RwLock<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> OnceMap<K, V> {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_try_init<E>(&self, key: &K, init: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        let cell = self.cell(key);
        cell.get_or_try_init(init).map(Clone::clone)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        cells.remove(key).and_then(|cell| cell.get().cloned())
    }

    pub fn keys(&self) -> Vec<K> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        cells
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        {
            let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cell) = cells.get(key) {
                return cell.clone();
            }
        }

        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        cells.entry(key.clone()).or_default().clone()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
