//! Document store contract and its sled implementation
use crate::document::{Document, Fields, Filter, Value};
use crate::utils::{self, CONTRACT_PREFIX, LISTING_PREFIX};
use anyhow::Context;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Listings,
    Contracts,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Listings => "listings",
            Collection::Contracts => "contracts",
        }
    }

    // users are keyed by the identity provider, so they never get a generated id
    fn id_prefix(&self) -> Option<&'static str> {
        match self {
            Collection::Users => None,
            Collection::Listings => Some(LISTING_PREFIX),
            Collection::Contracts => Some(CONTRACT_PREFIX),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of storing a record under a caller-chosen id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The id was already taken; the existing record is untouched.
    Exists,
}

/// Outcome of a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The guard field no longer held the expected value; nothing was written.
    GuardFailed,
    Missing,
}

/// Condition checked atomically with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub field: String,
    pub expected: Value,
}

impl Guard {
    pub fn new(field: &str, expected: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            expected: expected.into(),
        }
    }
}

/// Keyed collections of flat records. Single-document writes are atomic;
/// nothing spans two documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a new record under a generated id and returns that id.
    async fn create(&self, collection: Collection, fields: Fields) -> anyhow::Result<String>;

    /// Stores a new record under `id` unless the id is taken.
    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> anyhow::Result<InsertOutcome>;

    async fn get(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Document>>;

    async fn query(&self, collection: Collection, filter: &Filter) -> anyhow::Result<Vec<Document>>;

    /// Merges `patch` into the record.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Fields,
    ) -> anyhow::Result<UpdateOutcome>;

    /// Merges `patch` into the record only while `guard` holds.
    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        guard: &Guard,
        patch: Fields,
    ) -> anyhow::Result<UpdateOutcome>;
}

/// One sled tree per collection, values are CBOR encoded [`Fields`].
#[derive(Clone)]
pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    fn tree(&self, collection: Collection) -> anyhow::Result<sled::Tree> {
        self.instance
            .open_tree(collection.name())
            .with_context(|| format!("failed to open the {collection} tree"))
    }

    // compare-and-swap loop: retried only when another writer touched the same record
    fn merge(
        &self,
        collection: Collection,
        id: &str,
        guard: Option<&Guard>,
        patch: &Fields,
    ) -> anyhow::Result<UpdateOutcome> {
        let tree = self.tree(collection)?;
        loop {
            let Some(current) = tree.get(id.as_bytes())? else {
                return Ok(UpdateOutcome::Missing);
            };
            let mut fields = Document::decode_fields(&current)
                .with_context(|| format!("failed to decode {collection}/{id}"))?;

            if let Some(guard) = guard {
                if fields.get(&guard.field) != Some(&guard.expected) {
                    return Ok(UpdateOutcome::GuardFailed);
                }
            }

            fields.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            let next = Document::encode_fields(&fields)?;

            match tree.compare_and_swap(id.as_bytes(), Some(&current), Some(next))? {
                Ok(()) => return Ok(UpdateOutcome::Applied),
                Err(_) => continue,
            }
        }
    }
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn create(&self, collection: Collection, fields: Fields) -> anyhow::Result<String> {
        let prefix = collection
            .id_prefix()
            .with_context(|| format!("{collection} records need an explicit id"))?;
        let id = utils::new_record_id(prefix)?;
        match self.insert(collection, &id, fields).await? {
            InsertOutcome::Inserted => Ok(id),
            InsertOutcome::Exists => anyhow::bail!("generated id {collection}/{id} is already taken"),
        }
    }

    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> anyhow::Result<InsertOutcome> {
        let tree = self.tree(collection)?;
        let bytes = Document::encode_fields(&fields)?;

        match tree.compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes))? {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(_) => Ok(InsertOutcome::Exists),
        }
    }

    async fn get(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Document>> {
        let tree = self.tree(collection)?;
        match tree.get(id.as_bytes())? {
            Some(bytes) => {
                let fields = Document::decode_fields(&bytes)
                    .with_context(|| format!("failed to decode {collection}/{id}"))?;
                Ok(Some(Document::new(id, fields)))
            }
            None => Ok(None),
        }
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> anyhow::Result<Vec<Document>> {
        let tree = self.tree(collection)?;
        let mut found = Vec::new();

        for entry in tree.iter() {
            let (key, bytes) = entry?;
            let id = String::from_utf8(key.to_vec())
                .with_context(|| format!("non utf-8 key in {collection}"))?;
            let fields = Document::decode_fields(&bytes)
                .with_context(|| format!("failed to decode {collection}/{id}"))?;
            let doc = Document::new(id, fields);

            if doc.matches(filter) {
                found.push(doc);
            }
        }

        Ok(found)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Fields,
    ) -> anyhow::Result<UpdateOutcome> {
        self.merge(collection, id, None, &patch)
    }

    async fn update_if(
        &self,
        collection: Collection,
        id: &str,
        guard: &Guard,
        patch: Fields,
    ) -> anyhow::Result<UpdateOutcome> {
        self.merge(collection, id, Some(guard), &patch)
    }
}
