#![forbid(unsafe_code)]
use pretty_assertions::assert_eq;
use rowmap::{
    Config, ConfigError, Connection, Error, MappingCache, MappingCacheRegistry, MultiRowStrategy, Object,
    OrmConnection, RowShape, SqliteConnection, Value,
};
use std::{collections::BTreeMap, sync::Arc};

////////////////////////////////////////////////////////////////////////////////

#[derive(Object, Debug, Default, Clone, PartialEq)]
#[table_name("persons")]
struct Person {
    id: i64,
    name: String,
}

#[derive(Object, Debug, Clone, PartialEq)]
#[table_name("accounts")]
#[orm_constructor]
struct Account {
    account_id: i64,
    owner: String,
    balance: f64,
    active: bool,
    note: Option<String>,
    level: i32,
    payload: Vec<u8>,
}

#[derive(Object, Debug, Default, PartialEq)]
#[table_name("persons")]
#[column_alias_prefix("p_")]
struct AliasedPerson {
    id: i64,
    name: String,
}

#[derive(Object, Debug, Default, Clone, PartialEq)]
#[table_name("tags")]
struct Tag {
    #[column_name("tag")]
    label: String,
    weight: i64,
}

#[derive(Object, Debug, Default, Clone, PartialEq)]
#[table_name("counters")]
struct Counter {
    id: i64,
}

#[derive(Object, Debug, Clone, PartialEq)]
#[table_name("labels")]
#[orm_constructor]
struct Label {
    #[column_name("label_text")]
    text: String,
    rank: i64,
}

#[derive(Object, Debug, Default)]
#[table_name("persons")]
struct Nickname {
    id: i64,
    nickname: String,
}

#[derive(Object, Debug, Default)]
#[table_name("nowhere")]
struct Ghost {
    id: i64,
}

const SCHEMA: &str = "
    CREATE TABLE persons (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE accounts (
        account_id INTEGER, owner TEXT, balance REAL, active INTEGER,
        note TEXT, level INTEGER, payload BLOB,
        PRIMARY KEY (account_id, owner)
    );
    CREATE TABLE tags (tag TEXT PRIMARY KEY, weight INTEGER);
    CREATE TABLE counters (id INTEGER PRIMARY KEY);
    CREATE TABLE labels (label_text TEXT, rank INTEGER);
";

fn database() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_script(SCHEMA).unwrap();
    conn
}

fn cache(config: Config) -> Arc<MappingCache> {
    Arc::new(MappingCache::new("sqlite", config).unwrap())
}

fn people(names: &[&str]) -> Vec<Person> {
    names
        .iter()
        .map(|name| Person {
            id: 0,
            name: name.to_string(),
        })
        .collect()
}

fn account(id: i64) -> Account {
    Account {
        account_id: id,
        owner: format!("owner-{}", id),
        balance: 10.5 * id as f64,
        active: id % 2 == 0,
        note: (id > 1).then(|| "vip".to_string()),
        level: 3,
        payload: vec![1, 2, id as u8],
    }
}

////////////////////////////////////////////////////////////////////////////////

#[test]
fn batch_of_multi_row_insert_assigns_generated_ids() {
    let conn = database();
    let config = Config::default()
        .with_strategy(MultiRowStrategy::BatchOfMultiRowInOneStatement)
        .with_multi_row_size(2)
        .with_batch_size_with_multi_row(2);
    let orm = OrmConnection::new(&conn, cache(config));

    let mut persons = people(&["ann", "bob", "cid", "dan", "eve"]);
    let result = orm.insert_all(persons.iter_mut()).unwrap();
    assert_eq!(result, vec![2, 2, 1]);
    assert_eq!(result.iter().sum::<usize>(), 5);

    let mut ids = persons.iter().map(|p| p.id).collect::<Vec<_>>();
    assert!(ids.iter().all(|id| *id > 0));
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    let stored = orm
        .select_all::<Person>()
        .unwrap()
        .into_iter()
        .map(|p| (p.name, p.id))
        .collect::<BTreeMap<_, _>>();
    for person in &persons {
        assert_eq!(stored[&person.name], person.id);
    }
    assert!(conn.auto_commit().unwrap());
}

#[test]
fn constructor_round_trip_with_conversions() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default()));
    let accounts = (1..=3).map(account).collect::<Vec<_>>();

    let mut copies = accounts.clone();
    assert_eq!(orm.insert_all(copies.iter_mut()).unwrap(), vec![3]);

    let found = orm
        .select_by_primary_key::<Account>(&[Value::Int64(2), Value::String("owner-2".into())])
        .unwrap();
    assert_eq!(found, Some(account(2)));

    let mut all = orm.select_all::<Account>().unwrap();
    all.sort_by_key(|a| a.account_id);
    assert_eq!(all, accounts);
    assert!(orm.exists(&accounts[0]).unwrap());
    assert!(!orm.exists(&account(9)).unwrap());
}

#[test]
fn insert_parameters_materialize_back_into_equal_object() {
    let conn = database();
    let cache = cache(Config::default());
    let table = cache.table_mapping::<Account>(&conn).unwrap();
    let materializer = cache.columns_mapping::<Account>().unwrap();

    let original = account(4);
    let row = table.insert_parameters(&original).unwrap();
    let shape = RowShape::new(table.insert_columns().iter().cloned());
    assert_eq!(materializer.materialize_row(&shape, row).unwrap(), original);
}

#[test]
fn single_object_writes() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default()));

    let mut ann = Person {
        id: 0,
        name: "ann".into(),
    };
    let result = orm.insert_and_get(&mut ann).unwrap();
    assert_eq!(result.rows_modified, vec![1]);
    assert_eq!(result.generated_keys, vec![Value::Int64(ann.id)]);
    assert!(ann.id > 0);

    ann.name = "anne".into();
    assert_eq!(orm.update(&ann).unwrap(), 1);
    assert_eq!(
        orm.select_by_primary_key::<Person>(&[Value::Int64(ann.id)]).unwrap(),
        Some(ann.clone())
    );

    let heavy = Tag {
        label: "rust".into(),
        weight: 1,
    };
    assert_eq!(orm.merge(&heavy).unwrap(), 1);
    assert_eq!(
        orm.merge(&Tag {
            weight: 5,
            ..heavy.clone()
        })
        .unwrap(),
        1
    );
    assert_eq!(orm.select_all::<Tag>().unwrap(), vec![Tag { weight: 5, ..heavy }]);

    assert_eq!(orm.delete(&ann).unwrap(), 1);
    assert!(!orm.exists(&ann).unwrap());
    assert_eq!(orm.insert(&Person::default()).unwrap(), 1);
    assert_eq!(orm.delete_all_rows::<Person>().unwrap(), 1);
}

#[test]
fn bulk_update_and_delete() {
    let conn = database();
    let orm = OrmConnection::new(
        &conn,
        cache(Config::default().with_strategy(MultiRowStrategy::SimpleBatch).with_batch_size(2)),
    );
    let mut tags = ["a", "b", "c"]
        .iter()
        .map(|label| Tag {
            label: label.to_string(),
            weight: 1,
        })
        .collect::<Vec<_>>();

    assert_eq!(orm.merge_all(tags.iter()).unwrap(), vec![1, 1, 1]);
    for tag in &mut tags {
        tag.weight = 7;
    }
    assert_eq!(orm.update_all(tags.iter()).unwrap(), vec![1, 1, 1]);
    assert!(orm.select_all::<Tag>().unwrap().iter().all(|t| t.weight == 7));

    assert_eq!(orm.delete_all(vec![Some(&tags[0]), None]).unwrap(), vec![1]);
    assert_eq!(orm.select_all::<Tag>().unwrap().len(), 2);
}

#[test]
fn caller_transaction_is_not_committed() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default().with_multi_row_size(2)));

    orm.set_auto_commit(false).unwrap();
    let mut persons = people(&["ann", "bob", "cid"]);
    assert_eq!(orm.insert_all(persons.iter_mut()).unwrap(), vec![2, 1]);
    assert!(!orm.auto_commit().unwrap());
    orm.rollback().unwrap();
    orm.set_auto_commit(true).unwrap();

    assert!(orm.select_all::<Person>().unwrap().is_empty());
}

#[test]
fn failed_bulk_write_rolls_back_owned_transaction() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default().with_multi_row_size(2)));
    orm.insert(&Tag {
        label: "dup".into(),
        weight: 0,
    })
    .unwrap();

    let mut tags = ["x", "y", "dup"]
        .iter()
        .map(|label| Tag {
            label: label.to_string(),
            weight: 1,
        })
        .collect::<Vec<_>>();
    assert!(orm.insert_all(tags.iter_mut()).is_err());
    assert!(conn.auto_commit().unwrap());
    assert_eq!(orm.select_all::<Tag>().unwrap().len(), 1);
}

#[test]
fn aliased_columns_and_row_maps() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default()));
    let mut persons = people(&["ann"]);
    orm.insert_all(persons.iter_mut()).unwrap();

    let sql = "SELECT p.id AS p_id, p.name AS p_name, t.weight AS unrelated \
               FROM persons p LEFT JOIN tags t ON t.tag = p.name";
    let read = orm.read_list::<AliasedPerson>(sql, &[]).unwrap();
    assert_eq!(
        read,
        vec![AliasedPerson {
            id: persons[0].id,
            name: "ann".into()
        }]
    );

    let maps = orm.read_map_list(sql, &[]).unwrap();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0]["p_name"], Value::String("ann".into()));
    assert_eq!(maps[0]["unrelated"], Value::Null);

    let first = orm
        .read_first::<Person>("SELECT name FROM persons WHERE name = ?", &[Value::String("ann".into())])
        .unwrap();
    assert_eq!(first.map(|p| p.name), Some("ann".to_string()));
}

#[test]
fn repeated_projection_reuses_shape_metadata() {
    let conn = database();
    let cache = cache(Config::default());
    let orm = OrmConnection::new(&conn, cache.clone());
    let mut persons = people(&["ann", "bob"]);
    orm.insert_all(persons.iter_mut()).unwrap();

    orm.select_all::<Person>().unwrap();
    let materializer = cache.columns_mapping::<Person>().unwrap();
    let resolutions = materializer.shape_resolutions();
    assert_eq!(resolutions, 2);

    orm.select_all::<Person>().unwrap();
    orm.read_list::<Person>("SELECT id, name FROM persons WHERE id > ?", &[Value::Int64(0)])
        .unwrap();
    assert_eq!(materializer.shape_resolutions(), resolutions);

    orm.read_list::<Person>("SELECT name, id FROM persons", &[]).unwrap();
    assert_eq!(materializer.shape_resolutions(), resolutions + 2);
    assert_eq!(materializer.cached_shapes(), 2);
}

#[test]
fn configuration_errors_surface_before_any_write() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default()));

    match orm.insert(&Nickname::default()).unwrap_err() {
        Error::Config(err) => match *err {
            ConfigError::ColumnMismatch {
                missing_in_type,
                missing_in_table,
                ..
            } => {
                assert_eq!(missing_in_type, vec!["NAME".to_string()]);
                assert_eq!(missing_in_table, vec!["NICKNAME".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        },
        other => panic!("unexpected {:?}", other),
    }

    match orm.insert(&Ghost::default()).unwrap_err() {
        Error::Config(err) => assert!(matches!(*err, ConfigError::TableNotFound { .. })),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn incompatible_value_names_the_column() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default()));

    match orm
        .read_list::<Person>("SELECT 'seven' AS id, 'ann' AS name", &[])
        .unwrap_err()
    {
        Error::Materialize(err) => {
            assert_eq!(err.column, "id");
            assert_eq!(err.value_type, "String");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn file_database_and_named_caches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rowmap.db");
    let registry = MappingCacheRegistry::new();
    let config = Config::default().with_multi_row_size(3);

    {
        let conn = SqliteConnection::open(&path).unwrap();
        conn.execute_script(SCHEMA).unwrap();
        let orm = OrmConnection::new(&conn, registry.get_or_create("files", &config).unwrap());
        let mut persons = people(&["ann", "bob", "cid", "dan"]);
        assert_eq!(orm.insert_all(persons.iter_mut()).unwrap(), vec![3, 1]);
        assert!(orm
            .formatted_string::<Person>()
            .unwrap()
            .contains("[Person] is mapped to [persons] table"));
    }

    let conn = SqliteConnection::open(&path).unwrap();
    let orm = OrmConnection::new(&conn, registry.get_or_create("files", &Config::default()).unwrap());
    assert_eq!(orm.cache().config().multi_row_size, 3);
    assert_eq!(orm.select_all::<Person>().unwrap().len(), 4);
    assert_eq!(orm.cache().cached_tables(), vec!["PERSONS".to_string()]);
}

#[test]
fn fully_generated_table_accepts_bulk_inserts() {
    let strategies = [
        MultiRowStrategy::SimpleBatch,
        MultiRowStrategy::MultiRowInOneStatement,
        MultiRowStrategy::BatchOfMultiRowInOneStatement,
    ];
    for strategy in strategies {
        let conn = database();
        let config = Config::default()
            .with_strategy(strategy)
            .with_multi_row_size(2)
            .with_batch_size_with_multi_row(2);
        let orm = OrmConnection::new(&conn, cache(config));

        assert_eq!(orm.insert(&Counter::default()).unwrap(), 1);
        let mut counters = vec![Counter::default(); 3];
        assert_eq!(orm.insert_all(counters.iter_mut()).unwrap(), vec![1, 1, 1]);
        assert_eq!(counters.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 3, 4]);

        let mut stored = orm.select_all::<Counter>().unwrap();
        stored.sort_by_key(|c| c.id);
        assert_eq!(stored.len(), 4);
        assert_eq!(&stored[1..], &counters[..]);
    }
}

#[test]
fn constructor_error_names_the_declared_column() {
    let conn = database();
    let orm = OrmConnection::new(&conn, cache(Config::default()));
    orm.insert(&Label {
        text: "first".into(),
        rank: 1,
    })
    .unwrap();

    match orm
        .read_list::<Label>("SELECT label_text, rank FROM labels UNION ALL SELECT NULL, 2", &[])
        .unwrap_err()
    {
        Error::Materialize(err) => {
            assert_eq!(err.type_name, "Label");
            assert_eq!(err.column, "label_text");
            assert_eq!(err.value_type, "null");
        }
        other => panic!("unexpected {:?}", other),
    }

    match orm.read_list::<Label>("SELECT rank FROM labels", &[]).unwrap_err() {
        Error::Materialize(err) => assert_eq!(err.column, "label_text"),
        other => panic!("unexpected {:?}", other),
    }
}
