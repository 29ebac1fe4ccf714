//! CRUD tests for the in-memory engine driven through option objects

use idbkit_core::{
    DeleteConfig, Key, MemoryDatabase, MemoryFactory, QueryConfig, Schema, StoreError,
    WriteConfig, WriteMode,
};
use serde_json::{json, Value};

fn schema() -> Schema {
    Schema::from_json(
        r#"{
            "name": "crm",
            "version": 1,
            "stores": [
                {"name": "contacts", "keyPath": "id", "indexes": {"email": true, "company": false}},
                {"name": "activity", "autoIncrement": true},
                {"name": "settings"}
            ]
        }"#,
    )
    .unwrap()
}

fn open() -> (MemoryFactory, MemoryDatabase) {
    let mut factory = MemoryFactory::new();
    let db = factory.open(schema()).unwrap();
    (factory, db)
}

fn write(db: &MemoryDatabase, options: Value, mode: WriteMode) -> Result<Vec<Key>, StoreError> {
    let config: WriteConfig = serde_json::from_value(options).unwrap();
    db.write(&config.verify(db.schema(), mode)?)
}

fn contact(id: u32, email: &str, company: &str) -> Value {
    json!({"id": id, "email": email, "company": company})
}

#[test]
fn test_add_and_get() {
    let (_factory, db) = open();

    let keys = write(
        &db,
        json!({"store": "contacts", "value": contact(1, "ann@example.com", "Acme")}),
        WriteMode::Add,
    )
    .unwrap();
    assert_eq!(keys, vec![Key::from(1)]);

    let value = db.get("contacts", &Key::from(1)).unwrap().unwrap();
    assert_eq!(value["email"], "ann@example.com");
}

#[test]
fn test_add_duplicate_fails() {
    let (_factory, db) = open();
    let options = json!({"store": "contacts", "value": contact(1, "ann@example.com", "Acme")});

    write(&db, options.clone(), WriteMode::Add).unwrap();
    let result = write(&db, options, WriteMode::Add);
    assert!(matches!(result, Err(StoreError::Constraint(_))));
}

#[test]
fn test_put_replaces() {
    let (_factory, db) = open();
    write(
        &db,
        json!({"store": "contacts", "value": contact(1, "ann@example.com", "Acme")}),
        WriteMode::Put,
    )
    .unwrap();
    write(
        &db,
        json!({"store": "contacts", "value": contact(1, "ann@example.com", "Initech")}),
        WriteMode::Put,
    )
    .unwrap();

    let value = db.get("contacts", &Key::from(1)).unwrap().unwrap();
    assert_eq!(value["company"], "Initech");
    assert_eq!(db.count("contacts", None).unwrap(), 1);
}

#[test]
fn test_unique_index_violation_rolls_back_whole_write() {
    let (_factory, db) = open();
    let result = write(
        &db,
        json!({"store": "contacts", "values": [
            contact(1, "same@example.com", "Acme"),
            contact(2, "same@example.com", "Acme"),
        ]}),
        WriteMode::Add,
    );
    assert!(matches!(result, Err(StoreError::Constraint(_))));
    assert_eq!(db.count("contacts", None).unwrap(), 0);
}

#[test]
fn test_auto_increment_keys() {
    let (_factory, db) = open();

    let keys = write(
        &db,
        json!({"store": "activity", "values": [{"kind": "call"}, {"kind": "mail"}]}),
        WriteMode::Add,
    )
    .unwrap();
    assert_eq!(keys, vec![Key::from(1), Key::from(2)]);

    // An explicit numeric key moves the generator past it
    write(
        &db,
        json!({"store": "activity", "value": {"kind": "visit"}, "key": 10}),
        WriteMode::Add,
    )
    .unwrap();
    let keys = write(
        &db,
        json!({"store": "activity", "value": {"kind": "note"}}),
        WriteMode::Add,
    )
    .unwrap();
    assert_eq!(keys, vec![Key::from(11)]);
}

#[test]
fn test_out_of_line_keys() {
    let (_factory, db) = open();
    write(
        &db,
        json!({"store": "settings", "value": "dark", "key": "theme"}),
        WriteMode::Put,
    )
    .unwrap();
    assert_eq!(
        db.get("settings", &Key::from("theme")).unwrap(),
        Some(json!("dark"))
    );
}

#[test]
fn test_get_nonexistent() {
    let (_factory, db) = open();
    assert!(db.get("contacts", &Key::from(404)).unwrap().is_none());
}

#[test]
fn test_delete_by_key() {
    let (_factory, db) = open();
    write(
        &db,
        json!({"store": "contacts", "value": contact(1, "ann@example.com", "Acme")}),
        WriteMode::Add,
    )
    .unwrap();

    let config: DeleteConfig = serde_json::from_value(json!({"store": "contacts", "key": 1})).unwrap();
    let removed = db.delete(&config.verify(db.schema()).unwrap()).unwrap();
    assert_eq!(removed, 1);
    assert!(db.get("contacts", &Key::from(1)).unwrap().is_none());

    // Deleting again is not an error
    assert_eq!(db.delete(&config.verify(db.schema()).unwrap()).unwrap(), 0);
}

#[test]
fn test_delete_by_range() {
    let (_factory, db) = open();
    for id in 1..=6 {
        write(
            &db,
            json!({"store": "contacts", "value": contact(id, &format!("{}@example.com", id), "Acme")}),
            WriteMode::Add,
        )
        .unwrap();
    }

    let config: DeleteConfig = serde_json::from_value(json!({
        "store": "contacts",
        "range": {"lower": 2, "upper": 4, "upperInclusive": false}
    }))
    .unwrap();
    let removed = db.delete(&config.verify(db.schema()).unwrap()).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(db.count("contacts", None).unwrap(), 4);
    assert!(db.get("contacts", &Key::from(4)).unwrap().is_some());
}

#[test]
fn test_clear() {
    let (_factory, db) = open();
    write(
        &db,
        json!({"store": "activity", "values": [{"a": 1}, {"a": 2}]}),
        WriteMode::Add,
    )
    .unwrap();
    db.clear("activity").unwrap();
    assert_eq!(db.count("activity", None).unwrap(), 0);
}

#[test]
fn test_index_lookup_returns_first_by_primary_key() {
    let (_factory, db) = open();
    write(
        &db,
        json!({"store": "contacts", "values": [
            contact(3, "c@example.com", "Acme"),
            contact(1, "a@example.com", "Acme"),
            contact(2, "b@example.com", "Initech"),
        ]}),
        WriteMode::Add,
    )
    .unwrap();

    let config: QueryConfig =
        serde_json::from_value(json!({"store": "contacts", "index": "company", "key": "Acme"}))
            .unwrap();
    let records = db.query(&config.verify(db.schema()).unwrap()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].primary_key, Key::from(1));
    assert_eq!(records[0].key, Key::from("Acme"));

    let record = db
        .get_by_index("contacts", "email", &Key::from("b@example.com"))
        .unwrap()
        .unwrap();
    assert_eq!(record.primary_key, Key::from(2));
}
