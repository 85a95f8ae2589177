// Named-entry store flows against an in-memory project backend.
#![allow(missing_docs)]

mod common;

use common::{InMemoryProject, fast_policies};
use mgmt_client_app::{NamedEntryStore, ProjectConfigApplier, SnapshotCache, TrackedEntry};
use mgmt_client_domain::{
    EntryCollection, EntryId, FingerprintEncoding, PatchOpKind, PatchPath, ProjectId,
    ResolutionStrategy, ResolverPolicy,
};
use mgmt_client_shared::{ErrorCategory, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const TEMPLATES: &str = "/services/email/templates";

fn collection() -> Result<EntryCollection> {
    Ok(EntryCollection::new(
        PatchPath::parse(TEMPLATES)?,
        "id",
        "body",
        FingerprintEncoding::Base64Json,
    ))
}

fn resolver(max_attempts: u32) -> ResolverPolicy {
    ResolverPolicy {
        max_attempts,
        initial_delay_ms: 1,
        multiplier: 2,
        max_delay_ms: 4,
    }
}

fn store(
    project: &Arc<InMemoryProject>,
    cache_ttl: Option<Duration>,
    max_attempts: u32,
) -> Result<NamedEntryStore> {
    let applier = ProjectConfigApplier::new(
        Arc::clone(project) as _,
        Arc::new(SnapshotCache::from_ttl(cache_ttl)),
        fast_policies(),
    );
    Ok(NamedEntryStore::new(
        applier,
        ProjectId::parse("p1")?,
        collection()?,
        resolver(max_attempts),
    ))
}

fn welcome() -> Value {
    json!({"subject": "Welcome", "html": "<p>Hi</p>"})
}

#[tokio::test]
async fn create_resolves_server_assigned_id_by_fingerprint() -> Result<()> {
    let project = Arc::new(
        InMemoryProject::new(TEMPLATES, json!({"services": {"email": {"templates": []}}}))
            .rename_on_write("customer", "a1b2c3"),
    );
    project.set_stale_reads(1);
    let store = store(&project, None, 5)?;
    let ctx = RequestContext::new_request();

    let created = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await?;

    assert_eq!(created.entry.canonical_id.as_str(), "a1b2c3");
    assert!(created.entry.verified);
    assert!(created.warning.is_none());
    assert_eq!(created.strategy, Some(ResolutionStrategy::ContentFingerprint));
    assert_eq!(created.attempts, 2);

    let accepted = project.accepted();
    assert_eq!(accepted.len(), 1);
    let ops = accepted.first().map(|patch| patch.ops().to_vec()).unwrap_or_default();
    assert_eq!(ops.len(), 1);
    assert_eq!(
        ops.first().map(|op| op.path().to_string()),
        Some(format!("{TEMPLATES}/-"))
    );
    Ok(())
}

#[tokio::test]
async fn first_entry_synthesizes_the_missing_subtree_in_one_add() -> Result<()> {
    let project = Arc::new(InMemoryProject::new(TEMPLATES, json!({"services": {}})));
    let store = store(&project, None, 3)?;
    let ctx = RequestContext::new_request();

    let created = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await?;
    assert_eq!(created.entry.canonical_id.as_str(), "customer");

    let accepted = project.accepted();
    let ops = accepted.first().map(|patch| patch.ops().to_vec()).unwrap_or_default();
    assert_eq!(ops.len(), 1);
    let op = ops.first().expect("one op");
    assert_eq!(op.kind(), PatchOpKind::Add);
    assert_eq!(op.path().to_string(), "/services/email");
    let entry = collection()?.build_entry(&EntryId::parse("customer")?, &welcome());
    assert_eq!(op.value(), Some(&json!({"templates": [entry]})));
    Ok(())
}

#[tokio::test]
async fn unresolvable_create_falls_back_and_next_read_re_resolves() -> Result<()> {
    let project = Arc::new(
        InMemoryProject::new(TEMPLATES, json!({"services": {"email": {"templates": []}}}))
            .rename_on_write("customer", "a1b2c3"),
    );
    project.set_stale_reads(u32::MAX);
    let store = store(&project, None, 3)?;
    let ctx = RequestContext::new_request();

    let created = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await?;
    assert!(!created.entry.verified);
    assert_eq!(created.entry.canonical_id.as_str(), "customer");
    assert!(created.warning.is_some());
    assert_eq!(created.strategy, None);
    assert_eq!(created.attempts, 3);

    project.set_stale_reads(0);
    let read = store.read(&ctx, &created.entry).await?;
    assert!(read.entry.verified);
    assert_eq!(read.entry.canonical_id.as_str(), "a1b2c3");
    assert_eq!(read.payload, Some(welcome()));
    Ok(())
}

#[tokio::test]
async fn duplicate_create_is_rejected_locally() -> Result<()> {
    let project = Arc::new(InMemoryProject::new(
        TEMPLATES,
        json!({"services": {"email": {"templates": [{"id": "customer", "body": "x"}]}}}),
    ));
    let store = store(&project, None, 2)?;
    let ctx = RequestContext::new_request();

    let error = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await
        .err()
        .expect("duplicate");

    assert_eq!(error.category, ErrorCategory::LocalValidation);
    assert_eq!(error.code, ErrorCode::new("entry", "already_exists"));
    assert_eq!(project.patch_attempts.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_of_one_name_are_serialized() -> Result<()> {
    let project = Arc::new(InMemoryProject::new(
        TEMPLATES,
        json!({"services": {"email": {"templates": []}}}),
    ));
    let store = store(&project, None, 2)?;
    let ctx = RequestContext::new_request();
    let name = EntryId::parse("customer")?;

    let (first, second) = tokio::join!(
        store.create(&ctx, name.clone(), welcome()),
        store.create(&ctx, name.clone(), welcome()),
    );

    assert_eq!(usize::from(first.is_ok()) + usize::from(second.is_ok()), 1);
    assert_eq!(project.accepted().len(), 1);
    Ok(())
}

#[tokio::test]
async fn update_replaces_in_place_and_skips_unchanged_payloads() -> Result<()> {
    let project = Arc::new(InMemoryProject::new(
        TEMPLATES,
        json!({"services": {"email": {"templates": []}}}),
    ));
    let store = store(&project, Some(Duration::from_secs(30)), 2)?;
    let ctx = RequestContext::new_request();
    let created = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await?;

    let changed = json!({"subject": "Welcome back", "html": "<p>Hi</p>"});
    let updated = store.update(&ctx, &created.entry, changed.clone()).await?;
    assert_eq!(updated.payload, changed);

    let accepted = project.accepted();
    assert_eq!(accepted.len(), 2);
    let replace = accepted
        .get(1)
        .and_then(|patch| patch.ops().first().cloned())
        .expect("replace op");
    assert_eq!(replace.kind(), PatchOpKind::Replace);
    assert_eq!(replace.path().to_string(), format!("{TEMPLATES}/0"));

    store.update(&ctx, &updated, changed).await?;
    assert_eq!(project.accepted().len(), 2);
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_entry_and_tolerates_absence() -> Result<()> {
    let project = Arc::new(InMemoryProject::new(
        TEMPLATES,
        json!({"services": {"email": {"templates": [{"id": "keep", "body": "k"}]}}}),
    ));
    let store = store(&project, None, 2)?;
    let ctx = RequestContext::new_request();
    let created = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await?;

    let applied = store.delete(&ctx, &created.entry).await?;
    assert!(applied.patch.has_removals());
    assert_eq!(
        project.document().pointer(TEMPLATES),
        Some(&json!([{"id": "keep", "body": "k"}]))
    );

    let again = store.delete(&ctx, &created.entry).await?;
    assert!(!again.submitted());

    let error = store.read(&ctx, &created.entry).await.err().expect("gone");
    assert_eq!(error.category, ErrorCategory::NotFound);
    Ok(())
}

#[tokio::test]
async fn deleting_an_entry_that_stays_unverified_fails_without_a_patch() -> Result<()> {
    let project = Arc::new(
        InMemoryProject::new(TEMPLATES, json!({"services": {"email": {"templates": []}}}))
            .rename_on_write("customer", "srv-9"),
    );
    project.set_stale_reads(u32::MAX);
    let store = store(&project, None, 2)?;
    let ctx = RequestContext::new_request();

    let created = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await?;
    assert!(!created.entry.verified);

    project.set_stale_reads(0);
    project.overwrite_entry_field("srv-9", "body", json!("edited elsewhere"));

    let error = store
        .delete(&ctx, &created.entry)
        .await
        .err()
        .expect("unresolved entry");
    assert_eq!(error.category, ErrorCategory::NotFound);
    assert_eq!(error.code, ErrorCode::new("entry", "unresolved"));
    assert_eq!(error.metadata_value("supplied_id"), Some("customer"));
    assert_eq!(project.patch_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        project.document().pointer(TEMPLATES),
        Some(&json!([{"id": "srv-9", "body": "edited elsewhere"}]))
    );

    let update = store.update(&ctx, &created.entry, welcome()).await.err();
    assert_eq!(update.map(|e| e.category), Some(ErrorCategory::NotFound));
    assert_eq!(project.patch_attempts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn destructive_patches_retry_transient_server_failures() -> Result<()> {
    let project = Arc::new(InMemoryProject::new(
        TEMPLATES,
        json!({"services": {"email": {"templates": [{"id": "customer", "body": "x"}]}}}),
    ));
    project.fail_next_patch(ErrorEnvelope::unexpected(
        ErrorCode::new("remote", "transient_server"),
        "connection reset",
        ErrorCategory::TransientServer,
    ));
    let store = store(&project, None, 2)?;
    let ctx = RequestContext::new_request();
    let tracked = TrackedEntry {
        supplied_id: EntryId::parse("customer")?,
        canonical_id: EntryId::parse("customer")?,
        verified: true,
        payload: json!("x"),
    };

    store.delete(&ctx, &tracked).await?;
    assert_eq!(project.patch_attempts.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn additive_patches_do_not_retry_server_failures() -> Result<()> {
    let project = Arc::new(InMemoryProject::new(
        TEMPLATES,
        json!({"services": {"email": {"templates": []}}}),
    ));
    project.fail_next_patch(ErrorEnvelope::unexpected(
        ErrorCode::new("remote", "transient_server"),
        "bad gateway",
        ErrorCategory::TransientServer,
    ));
    let store = store(&project, None, 2)?;
    let ctx = RequestContext::new_request();

    let error = store
        .create(&ctx, EntryId::parse("customer")?, welcome())
        .await
        .err()
        .expect("server failure");
    assert_eq!(error.category, ErrorCategory::TransientServer);
    assert_eq!(project.patch_attempts.load(Ordering::SeqCst), 1);
    Ok(())
}
