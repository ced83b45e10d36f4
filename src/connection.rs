#![forbid(unsafe_code)]
use crate::{
    data::Value,
    error::Result,
    mapping::{InsertResult, MappingCache, TableMapping},
    object::Object,
    storage::Connection,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::trace;

////////////////////////////////////////////////////////////////////////////////

/// Object-level reads and writes over one connection.
///
/// Bindings come from the attached [`MappingCache`], so they are built once
/// and shared with every other `OrmConnection` using the same cache. Bulk
/// writes accept `&T`/`&mut T` or `Option` of them; absent entries are
/// skipped.
pub struct OrmConnection<'c> {
    conn: &'c dyn Connection,
    cache: Arc<MappingCache>,
}

impl<'c> OrmConnection<'c> {
    pub fn new(conn: &'c dyn Connection, cache: Arc<MappingCache>) -> Self {
        Self { conn, cache }
    }

    pub fn connection(&self) -> &'c dyn Connection {
        self.conn
    }

    pub fn cache(&self) -> &MappingCache {
        &self.cache
    }

    fn table<T: Object>(&self) -> Result<Arc<TableMapping<T>>> {
        self.cache.table_mapping::<T>(self.conn)
    }

    fn table_for<T: Object>(&self, table: &str) -> Result<Arc<TableMapping<T>>> {
        self.cache.table_mapping_for::<T>(self.conn, table)
    }

    ////////////////////////////////////////////////////////////////////////////

    pub fn read_list<T: Object>(&self, sql: &str, parameters: &[Value]) -> Result<Vec<T>> {
        let mapping = self.cache.columns_mapping::<T>()?;
        trace!(sql, parameters = parameters.len(), "read list");
        let mut stmt = self.conn.prepare(sql)?;
        stmt.set_parameters(parameters)?;
        let mut cursor = stmt.query()?;
        mapping.materialize_all(cursor.as_mut())
    }

    /// First row only; the rest of the result is not read.
    pub fn read_first<T: Object>(&self, sql: &str, parameters: &[Value]) -> Result<Option<T>> {
        let mapping = self.cache.columns_mapping::<T>()?;
        trace!(sql, parameters = parameters.len(), "read first");
        let mut stmt = self.conn.prepare(sql)?;
        stmt.set_parameters(parameters)?;
        let mut cursor = stmt.query()?;
        mapping.materialize(cursor.as_mut())
    }

    /// Rows as label to value maps.
    pub fn read_map_list(&self, sql: &str, parameters: &[Value]) -> Result<Vec<BTreeMap<String, Value>>> {
        trace!(sql, parameters = parameters.len(), "read map list");
        let mut stmt = self.conn.prepare(sql)?;
        stmt.set_parameters(parameters)?;
        let mut cursor = stmt.query()?;
        let shape = cursor.shape().clone();

        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row()? {
            rows.push(shape.labels().iter().cloned().zip(row).collect());
        }
        Ok(rows)
    }

    pub fn select_all<T: Object>(&self) -> Result<Vec<T>> {
        let table = self.table::<T>()?;
        self.read_list(table.sql().select_all(), &[])
    }

    /// `keys` in primary key order.
    pub fn select_by_primary_key<T: Object>(&self, keys: &[Value]) -> Result<Option<T>> {
        let table = self.table::<T>()?;
        self.read_first(table.select_by_primary_key_sql()?, keys)
    }

    pub fn exists<T: Object>(&self, object: &T) -> Result<bool> {
        let table = self.table::<T>()?;
        let sql = table.exists_sql()?;
        let keys = table.parameters_for(Some(object), table.primary_keys())?;
        let mut stmt = self.conn.prepare(sql)?;
        stmt.set_parameters(&keys)?;
        let mut cursor = stmt.query()?;
        Ok(cursor.next_row()?.is_some())
    }

    ////////////////////////////////////////////////////////////////////////////

    pub fn insert<T: Object>(&self, object: &T) -> Result<usize> {
        self.table::<T>()?.insert(self.conn, object)
    }

    pub fn insert_into<T: Object>(&self, table: &str, object: &T) -> Result<usize> {
        self.table_for::<T>(table)?.insert(self.conn, object)
    }

    pub fn insert_and_get<T: Object>(&self, object: &mut T) -> Result<InsertResult> {
        self.table::<T>()?.insert_and_get(self.conn, object)
    }

    /// Generated keys are written back onto the inserted objects.
    pub fn insert_all<'o, O: ObjectMut<'o>>(&self, objects: impl IntoIterator<Item = O>) -> Result<Vec<usize>> {
        self.table::<O::Object>()?
            .insert_all(self.conn, objects.into_iter().map(ObjectMut::into_option))
    }

    pub fn insert_all_into<'o, O: ObjectMut<'o>>(
        &self,
        table: &str,
        objects: impl IntoIterator<Item = O>,
    ) -> Result<Vec<usize>> {
        self.table_for::<O::Object>(table)?
            .insert_all(self.conn, objects.into_iter().map(ObjectMut::into_option))
    }

    pub fn merge<T: Object>(&self, object: &T) -> Result<usize> {
        self.table::<T>()?.merge(self.conn, object)
    }

    pub fn merge_all<'o, O: ObjectRef<'o>>(&self, objects: impl IntoIterator<Item = O>) -> Result<Vec<usize>> {
        self.table::<O::Object>()?
            .merge_all(self.conn, objects.into_iter().map(ObjectRef::into_option))
    }

    pub fn update<T: Object>(&self, object: &T) -> Result<usize> {
        self.table::<T>()?.update(self.conn, object)
    }

    pub fn update_all<'o, O: ObjectRef<'o>>(&self, objects: impl IntoIterator<Item = O>) -> Result<Vec<usize>> {
        self.table::<O::Object>()?
            .update_all(self.conn, objects.into_iter().map(ObjectRef::into_option))
    }

    pub fn delete<T: Object>(&self, object: &T) -> Result<usize> {
        self.table::<T>()?.delete(self.conn, object)
    }

    pub fn delete_all<'o, O: ObjectRef<'o>>(&self, objects: impl IntoIterator<Item = O>) -> Result<Vec<usize>> {
        self.table::<O::Object>()?
            .delete_all(self.conn, objects.into_iter().map(ObjectRef::into_option))
    }

    /// Deletes every row of the table bound to `T`.
    pub fn delete_all_rows<T: Object>(&self) -> Result<usize> {
        self.table::<T>()?.delete_all_rows(self.conn)
    }

    pub fn execute_update(&self, sql: &str, parameters: &[Value]) -> Result<usize> {
        crate::mapping::execute(self.conn, sql, parameters)
    }

    ////////////////////////////////////////////////////////////////////////////

    pub fn auto_commit(&self) -> Result<bool> {
        self.conn.auto_commit()
    }

    pub fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.conn.set_auto_commit(auto_commit)
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.commit()
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.rollback()
    }

    pub fn formatted_string<T: Object>(&self) -> Result<String> {
        self.cache.formatted_string::<T>(self.conn)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// `&mut T` or `Option<&mut T>` handed to a bulk insert.
pub trait ObjectMut<'o> {
    type Object: Object;

    fn into_option(self) -> Option<&'o mut Self::Object>;
}

impl<'o, T: Object> ObjectMut<'o> for &'o mut T {
    type Object = T;

    fn into_option(self) -> Option<&'o mut T> {
        Some(self)
    }
}

impl<'o, T: Object> ObjectMut<'o> for Option<&'o mut T> {
    type Object = T;

    fn into_option(self) -> Option<&'o mut T> {
        self
    }
}

/// `&T` or `Option<&T>` handed to a bulk write.
pub trait ObjectRef<'o> {
    type Object: Object;

    fn into_option(self) -> Option<&'o Self::Object>;
}

impl<'o, T: Object> ObjectRef<'o> for &'o T {
    type Object = T;

    fn into_option(self) -> Option<&'o T> {
        Some(self)
    }
}

impl<'o, T: Object> ObjectRef<'o> for Option<&'o T> {
    type Object = T;

    fn into_option(self) -> Option<&'o T> {
        self
    }
}
