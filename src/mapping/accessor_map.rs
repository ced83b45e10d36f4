#![forbid(unsafe_code)]
use super::canonical;
use crate::{
    data::Value,
    error::{ConfigError, MaterializeError, PreconditionError, Result},
    object::{Accessor, Object},
};
use std::{collections::HashMap, fmt};

////////////////////////////////////////////////////////////////////////////////

/// Maps canonical column names to the accessors of one object type.
///
/// When the type declares a column alias prefix, every column is also
/// reachable as `prefix + column`, which disambiguates joined projections.
/// Both maps are fixed at construction and only read afterwards.
pub struct ColumnToAccessorMap<T> {
    type_name: &'static str,
    accessors: Vec<(String, Accessor<T>)>,
    columns: HashMap<String, usize>,
    aliases: HashMap<String, usize>,
    alias_prefix: Option<String>,
}

impl<T: Object> ColumnToAccessorMap<T> {
    pub fn for_object() -> Result<Self> {
        Self::new(T::TYPE_NAME, T::accessors(), T::COLUMN_ALIAS_PREFIX)
    }
}

impl<T> ColumnToAccessorMap<T> {
    pub fn new<S: Into<String>>(
        type_name: &'static str,
        accessors: Vec<(S, Accessor<T>)>,
        alias_prefix: Option<&str>,
    ) -> Result<Self> {
        let accessors = accessors
            .into_iter()
            .map(|(column, accessor)| (column.into(), accessor))
            .collect::<Vec<_>>();

        let mut columns = HashMap::with_capacity(accessors.len());
        for (index, (column, accessor)) in accessors.iter().enumerate() {
            if accessor.capability().is_none() {
                return Err(ConfigError::InaccessibleColumn {
                    type_name,
                    column: column.clone(),
                }
                .into());
            }
            if columns.insert(canonical(column), index).is_some() {
                return Err(ConfigError::DuplicateColumn {
                    type_name,
                    column: column.clone(),
                }
                .into());
            }
        }

        let alias_prefix = alias_prefix.filter(|prefix| !prefix.is_empty());
        let mut aliases = HashMap::new();
        if let Some(prefix) = alias_prefix {
            for (index, (column, _)) in accessors.iter().enumerate() {
                let alias = canonical(&format!("{}{}", prefix, column));
                if columns.contains_key(&alias) {
                    return Err(ConfigError::AliasCollision {
                        prefix: prefix.to_string(),
                        column: column.clone(),
                    }
                    .into());
                }
                aliases.insert(alias, index);
            }
        }

        Ok(Self {
            type_name,
            accessors,
            columns,
            aliases,
            alias_prefix: alias_prefix.map(str::to_string),
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn alias_prefix(&self) -> Option<&str> {
        self.alias_prefix.as_deref()
    }

    /// Looks a column up by canonical name, falling back to the alias map.
    pub fn resolve(&self, column: &str) -> Option<&Accessor<T>> {
        self.resolve_index(column).map(|index| &self.accessors[index].1)
    }

    pub(crate) fn resolve_index(&self, column: &str) -> Option<usize> {
        let key = canonical(column);
        self.columns
            .get(&key)
            .or_else(|| self.aliases.get(&key))
            .copied()
    }

    pub(crate) fn accessor(&self, index: usize) -> &Accessor<T> {
        &self.accessors[index].1
    }

    /// Column names as declared by the type.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.iter().map(|(column, _)| column.as_str())
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }

    pub fn get_value(&self, object: &T, column: &str) -> Result<Value> {
        self.resolve(column)
            .and_then(|accessor| accessor.get(object))
            .ok_or_else(|| {
                PreconditionError::Unreadable {
                    type_name: self.type_name,
                    column: column.to_string(),
                }
                .into()
            })
    }

    /// Unknown columns are ignored.
    pub fn set_value(&self, object: &mut T, column: &str, value: Value) -> Result<()> {
        match self.resolve(column) {
            Some(accessor) => accessor
                .set(object, value)
                .map_err(|err| MaterializeError::new(self.type_name, column, err).into()),
            None => Ok(()),
        }
    }
}

impl<T> fmt::Display for ColumnToAccessorMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.columns.keys().collect::<Vec<_>>();
        keys.sort();
        writeln!(f, "COLUMNS {:?} are mapped to [{}]", keys, self.type_name)?;
        for (column, accessor) in &self.accessors {
            writeln!(f, "  COLUMN {} => {}", column, accessor)?;
        }
        write!(
            f,
            "  column alias prefix is [{}]",
            self.alias_prefix.as_deref().unwrap_or("")
        )?;
        let mut aliases = self.aliases.iter().collect::<Vec<_>>();
        aliases.sort();
        for (alias, index) in aliases {
            write!(f, "\n  ALIAS {} => {}", alias, self.accessors[*index].1)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
