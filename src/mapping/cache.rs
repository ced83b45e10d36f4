#![forbid(unsafe_code)]
use super::{canonical, ColumnToAccessorMap, ColumnsMapping, OnceMap, TableMapping};
use crate::{
    config::Config,
    data::{ColumnValueConverter, DefaultColumnValueConverter},
    error::{ConfigError, Result},
    object::Object,
    storage::Connection,
};
use std::{
    any::{Any, TypeId},
    fmt,
    hash::Hash,
    sync::Arc,
};
use tracing::{debug, trace};

pub const DEFAULT_CACHE_NAME: &str = "DEFAULT";

type Entry = Arc<dyn Any + Send + Sync>;

////////////////////////////////////////////////////////////////////////////////

/// Compute-once caches of the bindings built under one configuration.
///
/// Column bindings and materializers are keyed by type, table bindings by
/// canonical table name and type. Every entry is built at most once and is
/// immutable afterwards.
pub struct MappingCache {
    name: String,
    config: Config,
    converter: Arc<dyn ColumnValueConverter>,
    column_maps: OnceMap<TypeId, Entry>,
    materializers: OnceMap<TypeId, Entry>,
    tables: OnceMap<(String, TypeId), Entry>,
}

impl MappingCache {
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self> {
        Self::with_converter(name, config, Arc::new(DefaultColumnValueConverter))
    }

    pub fn with_converter(
        name: impl Into<String>,
        config: Config,
        converter: Arc<dyn ColumnValueConverter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            converter,
            column_maps: OnceMap::new(),
            materializers: OnceMap::new(),
            tables: OnceMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn column_map<T: Object>(&self) -> Result<Arc<ColumnToAccessorMap<T>>> {
        get_or_build(&self.column_maps, TypeId::of::<T>(), || {
            let map = ColumnToAccessorMap::<T>::for_object()?;
            debug!(type_name = T::TYPE_NAME, columns = map.len(), "built column binding");
            trace!("{}", map);
            Ok(map)
        })
    }

    pub fn columns_mapping<T: Object>(&self) -> Result<Arc<ColumnsMapping<T>>> {
        get_or_build(&self.materializers, TypeId::of::<T>(), || {
            ColumnsMapping::new(self.column_map::<T>()?, self.converter.clone())
        })
    }

    /// Binding of `T` to its declared table.
    pub fn table_mapping<T: Object>(&self, conn: &dyn Connection) -> Result<Arc<TableMapping<T>>> {
        self.table_mapping_for(conn, T::TABLE_NAME)
    }

    /// Binding of `T` to `table`, looked up in the catalog on first use.
    pub fn table_mapping_for<T: Object>(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> Result<Arc<TableMapping<T>>> {
        let key = (canonical(table), TypeId::of::<T>());
        get_or_build(&self.tables, key, || {
            let metadata = conn
                .table_metadata(table)?
                .ok_or_else(|| ConfigError::TableNotFound {
                    table: table.to_string(),
                })?;
            TableMapping::new(
                self.column_map::<T>()?,
                self.converter.clone(),
                metadata,
                self.config.processor::<T>(),
            )
        })
    }

    /// Diagnostic dump of the bindings of `T` to its declared table.
    pub fn formatted_string<T: Object>(&self, conn: &dyn Connection) -> Result<String> {
        let table = self.table_mapping::<T>(conn)?;
        let columns = self.columns_mapping::<T>()?;
        Ok(format!("{}\n{}", table, columns))
    }

    /// Canonical names of the tables with a cached binding.
    pub fn cached_tables(&self) -> Vec<String> {
        let mut tables = self
            .tables
            .keys()
            .into_iter()
            .map(|(table, _)| table)
            .collect::<Vec<_>>();
        tables.sort();
        tables.dedup();
        tables
    }
}

impl fmt::Debug for MappingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("tables", &self.cached_tables())
            .finish()
    }
}

fn get_or_build<K, V>(cache: &OnceMap<K, Entry>, key: K, build: impl FnOnce() -> Result<V>) -> Result<Arc<V>>
where
    K: Eq + Hash + Clone,
    V: Send + Sync + 'static,
{
    let entry = cache.get_or_try_init(&key, || build().map(|value| Arc::new(value) as Entry))?;
    Ok(entry
        .downcast::<V>()
        .unwrap_or_else(|_| unreachable!("cache entries are keyed by type")))
}

////////////////////////////////////////////////////////////////////////////////

/// Named [`MappingCache`]s, created on first use.
#[derive(Default)]
pub struct MappingCacheRegistry {
    caches: OnceMap<String, Arc<MappingCache>>,
}

impl MappingCacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache registered as `name`, creating it with `config` if
    /// absent. An existing cache keeps its original configuration.
    pub fn get_or_create(&self, name: &str, config: &Config) -> Result<Arc<MappingCache>> {
        self.caches.get_or_try_init(&name.to_string(), || {
            debug!(name, "creating mapping cache");
            MappingCache::new(name, config.clone()).map(Arc::new)
        })
    }

    pub fn default_cache(&self) -> Result<Arc<MappingCache>> {
        self.get_or_create(DEFAULT_CACHE_NAME, &Config::default())
    }

    pub fn get(&self, name: &str) -> Option<Arc<MappingCache>> {
        self.caches.get(&name.to_string())
    }

    /// Drops the cache registered as `name`. Holders of the old cache keep
    /// using it; later lookups build a fresh one.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.caches.remove(&name.to_string()).is_some();
        if removed {
            debug!(name, "invalidated mapping cache");
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.caches.keys();
        names.sort();
        names
    }
}

////////////////////////////////////////////////////////////////////////////////
