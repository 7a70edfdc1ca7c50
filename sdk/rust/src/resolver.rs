//! Idempotent get-or-create for named resources.
//!
//! The server enforces unique names per account but has no atomic
//! get-or-create endpoint. Creation is attempted first; a 409 means the name
//! is taken, so the existing resource is fetched by name instead. If the
//! lookup comes back empty (the resource vanished in between), creation is
//! tried again, up to a fixed number of attempts.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::description::Description;
use crate::error::{HubcapError, Result};
use crate::resource::{Channel, Resource, SubscriptionRecord};
use crate::transport::{HttpRequest, Transport};

/// Default bound on create/lookup rounds for one name.
pub const DEFAULT_MAX_RESOLVE_ATTEMPTS: u32 = 3;

/// A server record that lives in a named collection.
pub(crate) trait Resolvable: DeserializeOwned + Send {
    /// Media type name of a single record.
    const KIND: &'static str;
    /// Media type name of the collection.
    const COLLECTION: &'static str;

    fn name(&self) -> &str;
}

impl Resolvable for Channel {
    const KIND: &'static str = "channel";
    const COLLECTION: &'static str = "channels";

    fn name(&self) -> &str {
        &self.name
    }
}

impl Resolvable for SubscriptionRecord {
    const KIND: &'static str = "subscription";
    const COLLECTION: &'static str = "subscriptions";

    fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) struct Resolver<'a> {
    pub transport: &'a dyn Transport,
    pub description: &'a Description,
    pub max_attempts: u32,
}

impl Resolver<'_> {
    /// Get or create the resource called `name` in `collection`.
    ///
    /// `memo` is consulted first and updated on success; `wrap` turns the
    /// server record into the value stored there.
    pub async fn resolve<R, B, H>(
        &self,
        memo: &RwLock<HashMap<String, H>>,
        collection: &Resource,
        name: &str,
        params: &B,
        wrap: impl Fn(R) -> H,
    ) -> Result<H>
    where
        R: Resolvable,
        B: Serialize + Sync,
        H: Clone,
    {
        if let Some(found) = memo.read().await.get(name) {
            return Ok(found.clone());
        }

        for attempt in 1..=self.max_attempts {
            let record = match self.create::<R, B>(collection, params).await {
                Ok(record) => Some(record),
                Err(e) if e.is_conflict() => {
                    debug!(kind = R::KIND, name, attempt, "name taken, looking it up");
                    self.get_by_name::<R>(collection, name).await?
                }
                Err(e) => return Err(e),
            };

            if let Some(record) = record {
                let mut memo = memo.write().await;
                let held = memo
                    .entry(name.to_string())
                    .or_insert_with(|| wrap(record))
                    .clone();
                return Ok(held);
            }

            debug!(kind = R::KIND, name, attempt, "conflicting resource not found, retrying");
        }

        Err(HubcapError::Unresolved {
            name: name.to_string(),
            attempts: self.max_attempts,
        })
    }

    async fn create<R, B>(&self, collection: &Resource, params: &B) -> Result<R>
    where
        R: Resolvable,
        B: Serialize + Sync,
    {
        let request = HttpRequest::post(&collection.url).capability(&collection.capability);
        let request = self.description.exchange(request, R::KIND)?.json(params)?;
        self.transport.send(request).await?.into_json()
    }

    /// Look up a record by exact name.
    pub async fn get_by_name<R: Resolvable>(
        &self,
        collection: &Resource,
        name: &str,
    ) -> Result<Option<R>> {
        let request = HttpRequest::get(&collection.url)
            .capability(&collection.capability)
            .query("name", name);
        let request = self.description.accept(request, R::COLLECTION)?;
        let found: HashMap<String, R> = self.transport.send(request).await?.into_json()?;
        Ok(found.into_values().find(|record| record.name() == name))
    }

    /// Every record in the collection, sorted by name.
    pub async fn list<R: Resolvable>(&self, collection: &Resource) -> Result<Vec<R>> {
        let request = HttpRequest::get(&collection.url).capability(&collection.capability);
        let request = self.description.accept(request, R::COLLECTION)?;
        let found: HashMap<String, R> = self.transport.send(request).await?.into_json()?;
        let mut records: Vec<R> = found.into_values().collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(records)
    }

    /// Delete a record by URL.
    pub async fn delete<R: Resolvable>(&self, resource: &Resource) -> Result<()> {
        let request = HttpRequest::delete(&resource.url).capability(&resource.capability);
        let request = self.description.accept(request, R::KIND)?;
        self.transport.send(request).await?.into_empty()
    }
}
