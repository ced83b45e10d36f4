#![forbid(unsafe_code)]
use super::{Operation, OnceMap};
use std::{fmt, sync::Arc};

////////////////////////////////////////////////////////////////////////////////

/// Statement text for one table binding.
///
/// Statements that need a primary key are absent when the table has none.
/// Multi-row templates depend only on the row count and are cached by it.
pub struct TableSql {
    table: String,
    insert_columns: Vec<String>,
    insert: String,
    merge: String,
    update: Option<String>,
    delete: Option<String>,
    select_all: String,
    select_by_primary_key: Option<String>,
    exists: Option<String>,
    delete_all: String,
    multi_row: OnceMap<(Operation, usize), Arc<str>>,
}

impl TableSql {
    pub fn new(
        table: &str,
        columns: &[String],
        insert_columns: &[String],
        update_columns: &[String],
        primary_keys: &[String],
    ) -> Self {
        let where_keys = (!primary_keys.is_empty()).then(|| {
            primary_keys
                .iter()
                .map(|key| format!("{} = ?", key))
                .collect::<Vec<_>>()
                .join(" AND ")
        });

        let insert = if insert_columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            values_sql("INSERT INTO", table, insert_columns, 1)
        };

        let set_columns = update_columns
            .iter()
            .filter(|column| !primary_keys.contains(column))
            .map(|column| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            table: table.to_string(),
            insert_columns: insert_columns.to_vec(),
            insert,
            merge: values_sql("INSERT OR REPLACE INTO", table, insert_columns, 1),
            update: where_keys
                .as_ref()
                .map(|keys| format!("UPDATE {} SET {} WHERE {}", table, set_columns, keys)),
            delete: where_keys
                .as_ref()
                .map(|keys| format!("DELETE FROM {} WHERE {}", table, keys)),
            select_all: format!("SELECT {} FROM {}", columns.join(", "), table),
            select_by_primary_key: where_keys
                .as_ref()
                .map(|keys| format!("SELECT {} FROM {} WHERE {}", columns.join(", "), table, keys)),
            exists: where_keys
                .as_ref()
                .map(|keys| format!("SELECT 1 FROM {} WHERE {} LIMIT 1", table, keys)),
            delete_all: format!("DELETE FROM {}", table),
            multi_row: OnceMap::new(),
        }
    }

    pub fn insert(&self) -> &str {
        &self.insert
    }

    pub fn merge(&self) -> &str {
        &self.merge
    }

    pub fn update(&self) -> Option<&str> {
        self.update.as_deref()
    }

    pub fn delete(&self) -> Option<&str> {
        self.delete.as_deref()
    }

    pub fn select_all(&self) -> &str {
        &self.select_all
    }

    pub fn select_by_primary_key(&self) -> Option<&str> {
        self.select_by_primary_key.as_deref()
    }

    pub fn exists(&self) -> Option<&str> {
        self.exists.as_deref()
    }

    pub fn delete_all(&self) -> &str {
        &self.delete_all
    }

    pub fn multi_row_insert(&self, rows: usize) -> Arc<str> {
        self.multi_row(Operation::Insert, rows)
    }

    pub fn multi_row_merge(&self, rows: usize) -> Arc<str> {
        self.multi_row(Operation::Merge, rows)
    }

    /// Number of distinct multi-row templates built so far.
    pub fn cached_multi_row_templates(&self) -> usize {
        self.multi_row.len()
    }

    fn multi_row(&self, operation: Operation, rows: usize) -> Arc<str> {
        let verb = match operation {
            Operation::Merge => "INSERT OR REPLACE INTO",
            _ => "INSERT INTO",
        };
        let built = self.multi_row.get_or_try_init(&(operation, rows), || {
            Ok::<_, std::convert::Infallible>(values_sql(verb, &self.table, &self.insert_columns, rows).into())
        });
        match built {
            Ok(sql) => sql,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for TableSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let none = "<no primary key>";
        writeln!(f, "insert: {}", self.insert)?;
        writeln!(f, "merge: {}", self.merge)?;
        writeln!(f, "update: {}", self.update.as_deref().unwrap_or(none))?;
        writeln!(f, "delete: {}", self.delete.as_deref().unwrap_or(none))?;
        writeln!(f, "select all: {}", self.select_all)?;
        write!(
            f,
            "select by primary key: {}",
            self.select_by_primary_key.as_deref().unwrap_or(none)
        )
    }
}

/// `VERB table (c1, c2) VALUES (?, ?), (?, ?)` with `rows` tuples.
fn values_sql(verb: &str, table: &str, columns: &[String], rows: usize) -> String {
    let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
    format!(
        "{} {} ({}) VALUES {}",
        verb,
        table,
        columns.join(", "),
        vec![tuple.as_str(); rows].join(", ")
    )
}

////////////////////////////////////////////////////////////////////////////////
