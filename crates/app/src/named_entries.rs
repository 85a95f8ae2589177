//! Typed CRUD over one collection of named entries in a project document.
//!
//! Entries are created under a caller-supplied name but the server may store
//! them under another identifier. Each entry is therefore tracked with both
//! identifiers; an entry whose canonical identifier was never confirmed is
//! re-resolved the next time it is touched.

use crate::apply_patch::{AppliedPatch, ProjectConfigApplier};
use crate::resolve_canonical_id::{ResolveCanonicalIdInput, resolve_canonical_id};
use mgmt_client_domain::{
    ConfigDocument, EntryCollection, EntryId, ProjectId, ResolutionInput, ResolutionStrategy,
    ResolutionWarning, ResolverPolicy, best_candidate,
};
use mgmt_client_shared::{ErrorCategory, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// An entry the caller owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntry {
    /// Name the caller created the entry with.
    pub supplied_id: EntryId,
    /// Identifier the server stores the entry under.
    pub canonical_id: EntryId,
    /// False when `canonical_id` is an unconfirmed fallback.
    pub verified: bool,
    /// Last payload written.
    pub payload: Value,
}

/// Result of [`NamedEntryStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntry {
    /// The new entry.
    pub entry: TrackedEntry,
    /// Strategy that confirmed the canonical identifier; `None` on fallback.
    pub strategy: Option<ResolutionStrategy>,
    /// Resolver ticks spent.
    pub attempts: u32,
    /// Set when the canonical identifier could not be confirmed.
    pub warning: Option<ResolutionWarning>,
    /// Warnings the server attached to the mutation.
    pub server_warnings: Vec<Box<str>>,
}

/// Result of [`NamedEntryStore::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Tracking state, verified when re-resolution succeeded.
    pub entry: TrackedEntry,
    /// Entry object as stored.
    pub stored: Value,
    /// Decoded payload, when the content encoding is reversible.
    pub payload: Option<Value>,
}

/// CRUD over one [`EntryCollection`].
pub struct NamedEntryStore {
    applier: ProjectConfigApplier,
    project_id: ProjectId,
    collection: EntryCollection,
    resolver: ResolverPolicy,
    locks: Mutex<HashMap<EntryId, Arc<Mutex<()>>>>,
}

impl NamedEntryStore {
    /// Create a store for `collection` inside `project_id`'s document.
    pub fn new(
        applier: ProjectConfigApplier,
        project_id: ProjectId,
        collection: EntryCollection,
        resolver: ResolverPolicy,
    ) -> Self {
        Self {
            applier,
            project_id,
            collection,
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Collection this store manages.
    #[must_use]
    pub const fn collection(&self) -> &EntryCollection {
        &self.collection
    }

    /// Append a new entry and resolve the identifier the server stored it under.
    ///
    /// Fails with `LocalValidation` when `supplied_id` is already present.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        supplied_id: EntryId,
        payload: Value,
    ) -> Result<CreatedEntry> {
        let _guard = self.lock(&supplied_id).await;
        let collection = &self.collection;
        let entry = collection.build_entry(&supplied_id, &payload);

        let applied = self
            .applier
            .apply(ctx, &self.project_id, |builder| {
                if collection.find(builder.working(), supplied_id.as_str()).is_some() {
                    return Err(already_exists(&supplied_id));
                }
                builder.append(collection.path(), entry)?;
                Ok(())
            })
            .await?;

        let resolution = ResolutionInput {
            supplied_id: supplied_id.clone(),
            payload: payload.clone(),
            pre_mutation_ids: collection.ids(&applied.snapshot),
        };
        let outcome = resolve_canonical_id(
            ctx,
            self.applier.port().as_ref(),
            ResolveCanonicalIdInput {
                project_id: &self.project_id,
                collection,
                resolution: &resolution,
                strategies: &ResolutionStrategy::ALL,
            },
            self.resolver,
        )
        .await?;

        let verified = outcome.is_verified();
        Ok(CreatedEntry {
            entry: TrackedEntry {
                supplied_id,
                canonical_id: outcome.canonical_id,
                verified,
                payload,
            },
            strategy: outcome.strategy,
            attempts: outcome.attempts,
            warning: outcome.warning,
            server_warnings: applied.warnings,
        })
    }

    /// Read an entry, re-resolving it first when it is unverified.
    pub async fn read(&self, ctx: &RequestContext, entry: &TrackedEntry) -> Result<StoredEntry> {
        let (entry, document) = if entry.verified {
            let document = self.applier.read(ctx, &self.project_id).await?;
            (entry.clone(), document)
        } else {
            let document = self.applier.fetch_fresh(ctx, &self.project_id).await?;
            (self.verify(entry, &document), document)
        };

        let (_, stored) = self
            .collection
            .find(&document, entry.canonical_id.as_str())
            .ok_or_else(|| not_found(&entry))?;
        Ok(StoredEntry {
            payload: self.collection.decode_entry(stored),
            stored: stored.clone(),
            entry,
        })
    }

    /// Replace an entry's payload in place.
    ///
    /// Fails with `NotFound` when an unverified entry still cannot be located.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        entry: &TrackedEntry,
        payload: Value,
    ) -> Result<TrackedEntry> {
        let _guard = self.lock(&entry.supplied_id).await;
        let entry = self.located(ctx, entry).await?;
        let collection = &self.collection;
        let replacement = collection.build_entry(&entry.canonical_id, &payload);

        self.applier
            .apply(ctx, &self.project_id, |builder| {
                let (index, _) = collection
                    .find(builder.working(), entry.canonical_id.as_str())
                    .ok_or_else(|| not_found(&entry))?;
                builder.set(&collection.path().index(index), replacement)?;
                Ok(())
            })
            .await?;

        Ok(TrackedEntry { payload, ..entry })
    }

    /// Remove an entry. Removing a verified entry that is already gone
    /// succeeds; an unverified entry that still cannot be located fails with
    /// `NotFound` and nothing is submitted.
    pub async fn delete(&self, ctx: &RequestContext, entry: &TrackedEntry) -> Result<AppliedPatch> {
        let _guard = self.lock(&entry.supplied_id).await;
        let entry = self.located(ctx, entry).await?;
        let collection = &self.collection;

        self.applier
            .apply(ctx, &self.project_id, |builder| {
                builder.remove_where(collection.path(), |item| {
                    collection.entry_id(item) == Some(entry.canonical_id.as_str())
                })?;
                Ok(())
            })
            .await
    }

    /// Re-resolve an unverified entry against a fresh read; an entry that is
    /// still unverified afterwards is an error.
    async fn located(&self, ctx: &RequestContext, entry: &TrackedEntry) -> Result<TrackedEntry> {
        if entry.verified {
            return Ok(entry.clone());
        }
        let document = self.applier.fetch_fresh(ctx, &self.project_id).await?;
        let entry = self.verify(entry, &document);
        if entry.verified {
            Ok(entry)
        } else {
            Err(unresolved(&entry))
        }
    }

    /// One resolution tick with the strategies that need no pre-mutation state.
    fn verify(&self, entry: &TrackedEntry, document: &ConfigDocument) -> TrackedEntry {
        let resolution = ResolutionInput {
            supplied_id: entry.supplied_id.clone(),
            payload: entry.payload.clone(),
            pre_mutation_ids: BTreeSet::new(),
        };
        let Some(candidate) = best_candidate(
            &self.collection,
            document,
            &resolution,
            &ResolutionStrategy::VERIFY,
        ) else {
            tracing::debug!(
                supplied_id = entry.supplied_id.as_str(),
                "entry is still unverified"
            );
            return entry.clone();
        };

        let canonical_id = candidate.id;
        tracing::debug!(
            supplied_id = entry.supplied_id.as_str(),
            canonical_id = canonical_id.as_str(),
            strategy = %candidate.strategy,
            "entry verified on re-resolution"
        );
        TrackedEntry {
            canonical_id,
            verified: true,
            ..entry.clone()
        }
    }

    async fn lock(&self, id: &EntryId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

fn already_exists(id: &EntryId) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("entry", "already_exists"),
        format!("an entry named `{id}` already exists"),
    )
    .with_metadata("entry_id", id.as_str())
}

fn unresolved(entry: &TrackedEntry) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_category(
        ErrorCode::new("entry", "unresolved"),
        format!(
            "entry `{}` could not be located; its canonical identifier is unconfirmed",
            entry.supplied_id
        ),
        ErrorCategory::NotFound,
    )
    .with_metadata("entry_id", entry.canonical_id.as_str())
    .with_metadata("supplied_id", entry.supplied_id.as_str())
}

fn not_found(entry: &TrackedEntry) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_category(
        ErrorCode::not_found(),
        format!("entry `{}` does not exist", entry.canonical_id),
        ErrorCategory::NotFound,
    )
    .with_metadata("entry_id", entry.canonical_id.as_str())
    .with_metadata("supplied_id", entry.supplied_id.as_str())
}
