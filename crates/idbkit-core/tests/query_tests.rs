//! Query dispatch tests: strategy precedence, key ranges and cursor stepping

use std::ops::ControlFlow;

use idbkit_core::{
    Cursor, Direction, Key, MemoryDatabase, MemoryFactory, Mode, Query, QueryConfig, Record,
    Schema, WriteConfig, WriteMode,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn open_with_scores() -> (MemoryFactory, MemoryDatabase) {
    let schema = Schema::from_json(
        r#"{
            "name": "league",
            "version": 1,
            "stores": [{
                "name": "players",
                "keyPath": "id",
                "indexes": [
                    {"name": "score"},
                    {"name": "tags", "multiEntry": true},
                    {"name": "tagCount", "keyPath": "tags.length"}
                ]
            }]
        }"#,
    )
    .unwrap();
    let mut factory = MemoryFactory::new();
    let db = factory.open(schema).unwrap();

    let players = json!([
        {"id": 1, "score": 30, "tags": ["red", "captain"]},
        {"id": 2, "score": 10, "tags": ["blue"]},
        {"id": 3, "score": 20, "tags": ["red"]},
        {"id": 4, "score": 20, "tags": []},
        {"id": 5, "score": 50, "tags": ["blue", "red"]},
    ]);
    let config: WriteConfig =
        serde_json::from_value(json!({"store": "players", "values": players})).unwrap();
    db.write(&config.verify(db.schema(), WriteMode::Add).unwrap())
        .unwrap();

    (factory, db)
}

fn run(db: &MemoryDatabase, options: Value) -> Vec<Record> {
    let config: QueryConfig = serde_json::from_value(options).unwrap();
    db.query(&config.verify(db.schema()).unwrap()).unwrap()
}

fn ids(records: &[Record]) -> Vec<Key> {
    records.iter().map(|r| r.primary_key.clone()).collect()
}

fn keys(values: &[i32]) -> Vec<Key> {
    values.iter().map(|v| Key::from(*v)).collect()
}

#[test]
fn test_key_lookup() {
    let (_factory, db) = open_with_scores();
    let records = run(&db, json!({"store": "players", "key": 3}));
    assert_eq!(ids(&records), keys(&[3]));
    assert_eq!(records[0].value["score"], 20);
}

#[test]
fn test_key_lookup_missing() {
    let (_factory, db) = open_with_scores();
    assert!(run(&db, json!({"store": "players", "key": 99})).is_empty());
}

#[test]
fn test_full_store_iteration() {
    let (_factory, db) = open_with_scores();
    let records = run(&db, json!({"store": "players"}));
    assert_eq!(ids(&records), keys(&[1, 2, 3, 4, 5]));
}

#[test]
fn test_cursor_range_on_store() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "cursor": {"lower": 2, "upper": 4, "lowerInclusive": false}}),
    );
    assert_eq!(ids(&records), keys(&[3, 4]));
}

#[test]
fn test_cursor_only() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "index": "score", "cursor": {"only": 20}}),
    );
    assert_eq!(ids(&records), keys(&[3, 4]));
}

#[test]
fn test_index_cursor_orders_by_index_key() {
    let (_factory, db) = open_with_scores();
    let records = run(&db, json!({"store": "players", "index": "score"}));
    assert_eq!(ids(&records), keys(&[2, 3, 4, 1, 5]));
    assert_eq!(records[0].key, Key::from(10));
}

#[test]
fn test_cursor_reverse() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "index": "score", "cursor": {"direction": "prev"}}),
    );
    assert_eq!(ids(&records), keys(&[5, 1, 4, 3, 2]));
}

#[test]
fn test_cursor_next_unique() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "index": "score", "cursor": {"direction": "nextunique"}}),
    );
    assert_eq!(ids(&records), keys(&[2, 3, 1, 5]));
}

#[test]
fn test_cursor_advance() {
    let (_factory, db) = open_with_scores();
    let records = run(&db, json!({"store": "players", "cursor": {"advance": 2}}));
    assert_eq!(ids(&records), keys(&[1, 3, 5]));
}

#[test]
fn test_cursor_advance_with_limit() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "cursor": {"advance": 2}, "limit": 2}),
    );
    assert_eq!(ids(&records), keys(&[1, 3]));
}

#[test]
fn test_cursor_takes_precedence_over_key() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "key": 1, "cursor": {"lower": 4}}),
    );
    assert_eq!(ids(&records), keys(&[4, 5]));
}

#[test]
fn test_multi_entry_index() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "index": "tags", "cursor": {"only": "red"}}),
    );
    assert_eq!(ids(&records), keys(&[1, 3, 5]));

    let all = run(&db, json!({"store": "players", "index": "tags"}));
    // blue(2,5) captain(1) red(1,3,5); the empty tag list contributes nothing
    assert_eq!(ids(&all), keys(&[2, 5, 1, 1, 3, 5]));
}

#[test]
fn test_index_on_length() {
    let (_factory, db) = open_with_scores();
    let records = run(
        &db,
        json!({"store": "players", "index": "tagCount", "cursor": {"only": 1}}),
    );
    assert_eq!(ids(&records), keys(&[2, 3]));

    let empty = db.get_by_index("players", "tagCount", &Key::from(0)).unwrap();
    assert_eq!(empty.map(|r| r.primary_key), Some(Key::from(4)));
}

#[test]
fn test_built_query_matches_verified_config() {
    let (_factory, db) = open_with_scores();
    let built = Query::index_cursor(
        "players",
        "score",
        Cursor::default().direction(Direction::Prev).advance(2),
    )
    .limit(2)
    .mode(Mode::ReadWrite);

    let config: QueryConfig = serde_json::from_value(json!({
        "store": "players",
        "index": "score",
        "mode": "readwrite",
        "cursor": {"direction": "prev", "advance": 2},
        "limit": 2
    }))
    .unwrap();
    assert_eq!(config.verify(db.schema()).unwrap(), built);
    assert_eq!(ids(&db.query(&built).unwrap()), keys(&[5, 4]));
}

#[test]
fn test_for_each_stops_on_break() {
    let (_factory, db) = open_with_scores();
    let mut seen = Vec::new();
    db.for_each(&Query::cursor("players", Default::default()), |record| {
        seen.push(record.primary_key);
        if seen.len() == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .unwrap();
    assert_eq!(seen, keys(&[1, 2]));
}

#[test]
fn test_count_with_range() {
    let (_factory, db) = open_with_scores();
    let range = idbkit_core::KeyRange::lower_bound(Key::from(3), false);
    assert_eq!(db.count("players", Some(&range)).unwrap(), 3);
}
