//! MongoDB record store backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{NewRecord, Record, RecordStore};
use crate::error::StoreError;

/// MongoDB error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Stored shape of a record. Timestamps are unix millis in the
/// collection and converted at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbRecord {
    id: i64,
    name: String,
    email: String,
    department: String,
    created_at: i64,
}

impl From<DbRecord> for Record {
    fn from(db: DbRecord) -> Self {
        Record {
            id: db.id,
            name: db.name,
            email: db.email,
            department: db.department,
            created_at: DateTime::from_timestamp_millis(db.created_at).unwrap_or_default(),
        }
    }
}

/// Record store backed by MongoDB.
///
/// Ids come from a counter document (`$inc` on a counters collection),
/// and email uniqueness is enforced by a unique index so concurrent
/// inserts cannot race past the duplicate check.
#[derive(Debug, Clone)]
pub struct MongoRecordStore {
    db: mongodb::Database,
    records: Collection<DbRecord>,
    counters: Collection<Document>,
}

impl MongoRecordStore {
    /// Connect to MongoDB and prepare the records collection.
    ///
    /// # Errors
    /// Returns error if the connection or index creation fails.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB");

        let db = client.database(db_name);
        let records: Collection<DbRecord> = db.collection("records");

        // Unique index on email is the authoritative duplicate guard
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        records.create_index(index).await?;

        Ok(Self {
            counters: db.collection("counters"),
            records,
            db,
        })
    }

    /// Allocate the next record id from the counter document.
    async fn next_id(&self) -> Result<i64, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .counters
            .find_one_and_update(doc! { "_id": "records" }, doc! { "$inc": { "seq": 1_i64 } })
            .with_options(options)
            .await?
            .ok_or_else(|| StoreError::Backend("counter upsert returned no document".into()))?;

        counter
            .get_i64("seq")
            .map_err(|e| StoreError::Backend(format!("bad counter document: {e}")))
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn insert(&self, new: NewRecord) -> Result<Record, StoreError> {
        let db_record = DbRecord {
            id: self.next_id().await?,
            name: new.name,
            email: new.email.to_lowercase(),
            department: new.department,
            created_at: Utc::now().timestamp_millis(),
        };

        match self.records.insert_one(&db_record).await {
            Ok(_) => Ok(db_record.into()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::DuplicateEmail(db_record.email)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Record>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "id": -1 }).build();
        let mut cursor = self.records.find(doc! {}).with_options(options).await?;

        let mut records = Vec::new();
        while let Some(result) = cursor.next().await {
            records.push(Record::from(result?));
        }

        Ok(records)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.count_documents(doc! {}).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}
