#![allow(dead_code)]

use crudgate_core::db::open_db_in_memory;
use crudgate_core::{
    AuditEntry, AuditError, AuditResult, AuditSink, EntityRegistry, EntitySchema, IdStrategy,
    OperationEnvelope, OperationKind, Record,
};
use rusqlite::Connection;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Host schema used across dispatcher and store tests.
pub const FIXTURE_SCHEMA: &str = "
    CREATE TABLE users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        views INTEGER NOT NULL DEFAULT 0,
        published INTEGER NOT NULL DEFAULT 0,
        author_id TEXT REFERENCES users(id),
        deleted_at INTEGER
    );
    CREATE TABLE comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL,
        body TEXT NOT NULL
    );
";

pub fn open_fixture_db() -> Connection {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(FIXTURE_SCHEMA).unwrap();
    conn
}

pub fn fixture_entities() -> Vec<EntitySchema> {
    vec![
        EntitySchema::new("User")
            .with_table("users")
            .with_id_strategy(IdStrategy::Uuid),
        EntitySchema::new("Post")
            .with_table("posts")
            .with_soft_delete("deleted_at")
            .with_relation("author", "author_id", "User")
            .with_expand("author"),
        EntitySchema::new("Comment")
            .with_table("comments")
            .with_relation("post", "post_id", "Post"),
    ]
}

pub fn fixture_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("users".to_string(), "User".to_string()),
        ("posts".to_string(), "Post".to_string()),
        ("comments".to_string(), "Comment".to_string()),
    ])
}

pub fn fixture_registry(conn: &Connection) -> EntityRegistry {
    EntityRegistry::build(conn, fixture_entities(), fixture_aliases()).unwrap()
}

pub fn insert_user(conn: &Connection, id: &str, name: &str) {
    conn.execute(
        "INSERT INTO users (id, name) VALUES (?1, ?2);",
        [id, name],
    )
    .unwrap();
}

pub fn insert_post(conn: &Connection, title: &str, views: i64, author_id: Option<&str>) -> i64 {
    conn.execute(
        "INSERT INTO posts (title, views, author_id) VALUES (?1, ?2, ?3);",
        rusqlite::params![title, views, author_id],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_comment(conn: &Connection, post_id: i64, body: &str) -> i64 {
    conn.execute(
        "INSERT INTO comments (post_id, body) VALUES (?1, ?2);",
        rusqlite::params![post_id, body],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn envelope(kind: OperationKind, resource: &str, params: Value) -> OperationEnvelope {
    OperationEnvelope::new(kind, resource, params)
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("record must be an object, got {other}"),
    }
}

pub fn ids_of(data: &Value) -> Vec<Value> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].clone())
        .collect()
}

pub fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

/// Audit sink that keeps entries in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    pub entries: RefCell<Vec<AuditEntry>>,
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries.borrow_mut().push(entry.clone());
        Ok(())
    }
}

/// Audit sink that rejects every entry while counting attempts.
#[derive(Default)]
pub struct FailingAuditSink {
    pub attempts: RefCell<usize>,
}

impl AuditSink for FailingAuditSink {
    fn record(&self, _entry: &AuditEntry) -> AuditResult<()> {
        *self.attempts.borrow_mut() += 1;
        Err(AuditError::Rejected("audit store offline".to_string()))
    }
}
