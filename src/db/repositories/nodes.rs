use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};
use serde_json::{Map, Value};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_json, to_json},
    },
    store::{ChangeCallback, FieldMap, RealtimeStore, StorePath, Subscription},
};

/// Where a store path lands in the `nodes` table.
enum NodeAddress {
    Root,
    Collection(String),
    Record(String, String),
}

impl NodeAddress {
    fn from_path(path: &StorePath) -> Result<Self> {
        match path.segments() {
            [] => Ok(NodeAddress::Root),
            [collection] => Ok(NodeAddress::Collection(collection.clone())),
            [collection, key] => Ok(NodeAddress::Record(collection.clone(), key.clone())),
            _ => bail!("paths deeper than collection/key are not supported: {path}"),
        }
    }
}

fn read_collection(tx: &Transaction<'_>, collection: &str) -> Result<Map<String, Value>> {
    let mut stmt = tx.prepare(
        "SELECT key, value FROM nodes
         WHERE collection = ?1
         ORDER BY key ASC",
    )?;
    let mut rows = stmt.query(params![collection])?;
    let mut children = Map::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let value: String = row.get(1)?;
        children.insert(key, parse_json(&value, "nodes.value")?);
    }
    Ok(children)
}

fn read_record(tx: &Transaction<'_>, collection: &str, key: &str) -> Result<Option<Value>> {
    let value: Option<String> = tx
        .query_row(
            "SELECT value FROM nodes WHERE collection = ?1 AND key = ?2",
            params![collection, key],
            |row| row.get(0),
        )
        .optional()?;
    value.map(|raw| parse_json(&raw, "nodes.value")).transpose()
}

fn write_record(tx: &Transaction<'_>, collection: &str, key: &str, value: &Value) -> Result<()> {
    if value.is_null() || value.as_object().is_some_and(Map::is_empty) {
        delete_record(tx, collection, key)?;
        return Ok(());
    }
    tx.execute(
        "INSERT INTO nodes (collection, key, value, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (collection, key) DO UPDATE
         SET value = excluded.value,
             updated_at = excluded.updated_at",
        params![collection, key, to_json(value)?, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn delete_record(tx: &Transaction<'_>, collection: &str, key: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM nodes WHERE collection = ?1 AND key = ?2",
        params![collection, key],
    )?;
    Ok(())
}

fn replace_collection(tx: &Transaction<'_>, collection: &str, value: &Value) -> Result<()> {
    tx.execute("DELETE FROM nodes WHERE collection = ?1", params![collection])?;
    match value {
        Value::Null => Ok(()),
        Value::Object(children) => {
            for (key, child) in children {
                write_record(tx, collection, key, child)?;
            }
            Ok(())
        }
        _ => bail!("collection {collection} must be an object"),
    }
}

fn check_field_names(path: &StorePath, fields: &FieldMap) -> Result<()> {
    for key in fields.keys() {
        if key.is_empty() || key.contains('/') {
            bail!("invalid field name '{key}' for {path}");
        }
    }
    Ok(())
}

impl Database {
    /// Snapshot of the value at `path`; `Value::Null` when nothing is stored.
    pub async fn read_node(&self, path: &StorePath) -> Result<Value> {
        let address = NodeAddress::from_path(path)?;
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let value = match address {
                NodeAddress::Root => {
                    let mut stmt = tx.prepare("SELECT DISTINCT collection FROM nodes ORDER BY collection")?;
                    let collections = stmt
                        .query_map([], |row| row.get::<_, String>(0))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    drop(stmt);

                    let mut root = Map::new();
                    for collection in collections {
                        let children = read_collection(&tx, &collection)?;
                        root.insert(collection, Value::Object(children));
                    }
                    if root.is_empty() {
                        Value::Null
                    } else {
                        Value::Object(root)
                    }
                }
                NodeAddress::Collection(collection) => {
                    let children = read_collection(&tx, &collection)?;
                    if children.is_empty() {
                        Value::Null
                    } else {
                        Value::Object(children)
                    }
                }
                NodeAddress::Record(collection, key) => {
                    read_record(&tx, &collection, &key)?.unwrap_or(Value::Null)
                }
            };
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    /// Applies a partial update in one transaction.
    ///
    /// At a record, fields are merged into the stored object. At a collection
    /// or the root, each field replaces a whole child.
    pub async fn merge_node(&self, path: &StorePath, fields: FieldMap) -> Result<()> {
        check_field_names(path, &fields)?;
        let address = NodeAddress::from_path(path)?;
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            match address {
                NodeAddress::Root => {
                    for (collection, value) in &fields {
                        replace_collection(&tx, collection, value)?;
                    }
                }
                NodeAddress::Collection(collection) => {
                    for (key, value) in &fields {
                        write_record(&tx, &collection, key, value)?;
                    }
                }
                NodeAddress::Record(collection, key) => {
                    let mut record = match read_record(&tx, &collection, &key)? {
                        Some(Value::Object(existing)) => existing,
                        _ => Map::new(),
                    };
                    for (field, value) in fields {
                        if value.is_null() {
                            record.remove(&field);
                        } else {
                            record.insert(field, value);
                        }
                    }
                    write_record(&tx, &collection, &key, &Value::Object(record))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn notify(&self, changed: &StorePath) {
        for (path, callback) in self.subscribers.affected(changed) {
            match self.read_node(&path).await {
                Ok(snapshot) => callback(&snapshot),
                Err(err) => log::error!("Failed to read {path} for subscriber: {err:#}"),
            }
        }
    }
}

impl RealtimeStore for Database {
    async fn get(&self, path: &str) -> Result<Value> {
        self.read_node(&StorePath::parse(path)?).await
    }

    async fn subscribe(&self, path: &str, on_change: ChangeCallback) -> Result<Subscription> {
        let path = StorePath::parse(path)?;
        NodeAddress::from_path(&path)?;
        let subscription = self.subscribers.register(path.clone(), on_change.clone());
        let snapshot = self.read_node(&path).await?;
        on_change(&snapshot);
        Ok(subscription)
    }

    async fn update(&self, path: &str, fields: FieldMap) -> Result<()> {
        let path = StorePath::parse(path)?;
        self.merge_node(&path, fields).await?;
        self.notify(&path).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn open_database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("roomwatch.sqlite3")).unwrap();
        (dir, db)
    }

    fn fields(value: Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn record_updates_merge_fields() {
        let (_dir, db) = open_database();

        db.update(
            "RFID_Cards/14:d3:95:a7",
            fields(json!({ "Name": "R. Cruz", "TimeIn": "2024-10-05 08:00:00" })),
        )
        .await
        .unwrap();
        db.update(
            "RFID_Cards/14:d3:95:a7",
            fields(json!({ "TimeOut": "2024-10-05 09:30:00", "TimeIn": null })),
        )
        .await
        .unwrap();

        let record = db.get("RFID_Cards/14:d3:95:a7").await.unwrap();
        assert_eq!(record, json!({ "Name": "R. Cruz", "TimeOut": "2024-10-05 09:30:00" }));

        let collection = db.get("RFID_Cards").await.unwrap();
        assert_eq!(collection, json!({ "14:d3:95:a7": record }));
    }

    #[tokio::test]
    async fn emptied_records_are_deleted() {
        let (_dir, db) = open_database();

        db.update("OB_Rooms_Information/105", fields(json!({ "Section": "A" })))
            .await
            .unwrap();
        db.update("OB_Rooms_Information/105", fields(json!({ "Section": null })))
            .await
            .unwrap();

        assert_eq!(db.get("OB_Rooms_Information").await.unwrap(), Value::Null);
        assert_eq!(db.get("").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn collection_updates_replace_children() {
        let (_dir, db) = open_database();

        db.update("RFID_Cards", fields(json!({ "a": { "TimeIn": "08:00" }, "b": { "TimeIn": "09:00" } })))
            .await
            .unwrap();
        db.update("RFID_Cards", fields(json!({ "a": { "TimeOut": "10:00" }, "b": null })))
            .await
            .unwrap();

        assert_eq!(
            db.get("RFID_Cards").await.unwrap(),
            json!({ "a": { "TimeOut": "10:00" } })
        );
    }

    #[tokio::test]
    async fn deep_paths_are_rejected() {
        let (_dir, db) = open_database();
        assert!(db.get("RFID_Cards/a/TimeIn").await.is_err());
        assert!(db
            .update("RFID_Cards/a/TimeIn", fields(json!({ "x": 1 })))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("roomwatch.sqlite3");
        {
            let db = Database::new(db_path.clone()).unwrap();
            db.update("RFID_Cards/x", fields(json!({ "TimeIn": "08:00" })))
                .await
                .unwrap();
        }

        let db = Database::new(db_path).unwrap();
        assert_eq!(db.get("RFID_Cards/x/").await.unwrap(), json!({ "TimeIn": "08:00" }));
    }

    #[tokio::test]
    async fn subscribers_see_related_updates() {
        let (_dir, db) = open_database();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ChangeCallback = Arc::new(move |value: &Value| {
            sink.lock().unwrap().push(value.clone());
        });

        let subscription = db.subscribe("RFID_Cards", callback).await.unwrap();
        db.update("RFID_Cards/x", fields(json!({ "TimeIn": "08:00" })))
            .await
            .unwrap();
        db.update("OB_Rooms_Information/105", fields(json!({ "Section": "A" })))
            .await
            .unwrap();
        drop(subscription);
        db.update("RFID_Cards/x", fields(json!({ "TimeOut": "09:00" })))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![Value::Null, json!({ "x": { "TimeIn": "08:00" } })]);
    }
}
