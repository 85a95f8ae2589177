//! Build, pre-flight and submit one ordered patch against a project document.

use crate::snapshot_cache::SnapshotCache;
use mgmt_client_domain::{ConfigDocument, PatchBuilder, PatchSet, ProjectId};
use mgmt_client_ports::ProjectConfigPort;
use mgmt_client_shared::{
    ErrorCategory, ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy, retry_async,
};
use std::sync::Arc;

/// Retry policies applied to remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    /// Reads, creates and patches without removals.
    pub standard: RetryPolicy,
    /// Calls that remove data.
    pub destructive: RetryPolicy,
}

impl RetryPolicies {
    /// Policy for a patch: destructive when it removes anything.
    #[must_use]
    pub fn for_patch(&self, patch: &PatchSet) -> RetryPolicy {
        if patch.has_removals() {
            self.destructive
        } else {
            self.standard
        }
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            standard: RetryPolicy::rate_limit_only(),
            destructive: RetryPolicy::rate_limit_or_server_error(),
        }
    }
}

/// Outcome of [`ProjectConfigApplier::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPatch {
    /// Document the patch was built against.
    pub snapshot: ConfigDocument,
    /// Ops sent to the server, in order. Empty when nothing changed.
    pub patch: PatchSet,
    /// Document after the mutation.
    pub document: ConfigDocument,
    /// Non-fatal warnings the server returned.
    pub warnings: Vec<Box<str>>,
}

impl AppliedPatch {
    /// Returns true when a request was sent.
    #[must_use]
    pub fn submitted(&self) -> bool {
        !self.patch.is_empty()
    }
}

/// Reads and mutates one project's nested configuration document.
#[derive(Clone)]
pub struct ProjectConfigApplier {
    port: Arc<dyn ProjectConfigPort>,
    cache: Arc<SnapshotCache>,
    policies: RetryPolicies,
}

impl ProjectConfigApplier {
    /// Create an applier.
    pub fn new(
        port: Arc<dyn ProjectConfigPort>,
        cache: Arc<SnapshotCache>,
        policies: RetryPolicies,
    ) -> Self {
        Self {
            port,
            cache,
            policies,
        }
    }

    /// Underlying port.
    #[must_use]
    pub fn port(&self) -> &Arc<dyn ProjectConfigPort> {
        &self.port
    }

    /// Retry policies in use.
    #[must_use]
    pub const fn policies(&self) -> RetryPolicies {
        self.policies
    }

    /// Current document, from the snapshot cache when it holds one.
    pub async fn read(&self, ctx: &RequestContext, project_id: &ProjectId) -> Result<ConfigDocument> {
        if let Some(document) = self.cache.get(project_id).await {
            return Ok(document);
        }
        self.fetch_fresh(ctx, project_id).await
    }

    /// Current document, always from the server.
    pub async fn fetch_fresh(
        &self,
        ctx: &RequestContext,
        project_id: &ProjectId,
    ) -> Result<ConfigDocument> {
        retry_async(ctx, self.policies.standard, "fetch_config", || {
            self.port.fetch_config(ctx, project_id.clone())
        })
        .await
    }

    /// Build a patch with `build` against the latest snapshot and submit it.
    ///
    /// The built patch is replayed locally first; a patch that does not apply
    /// to the snapshot fails with `LocalValidation` and is never sent. An
    /// empty patch sends nothing.
    pub async fn apply<F>(
        &self,
        ctx: &RequestContext,
        project_id: &ProjectId,
        build: F,
    ) -> Result<AppliedPatch>
    where
        F: FnOnce(&mut PatchBuilder) -> Result<()>,
    {
        ctx.ensure_not_cancelled("apply_patch.start")?;
        let snapshot = self.read(ctx, project_id).await?;

        let mut builder = PatchBuilder::new(&snapshot);
        build(&mut builder)?;
        let patch = builder.build();
        self.submit(ctx, project_id, snapshot, patch).await
    }

    /// Submit a caller-built patch against the latest snapshot.
    pub async fn apply_ops(
        &self,
        ctx: &RequestContext,
        project_id: &ProjectId,
        patch: PatchSet,
    ) -> Result<AppliedPatch> {
        ctx.ensure_not_cancelled("apply_patch.start")?;
        let snapshot = self.read(ctx, project_id).await?;
        self.submit(ctx, project_id, snapshot, patch).await
    }

    async fn submit(
        &self,
        ctx: &RequestContext,
        project_id: &ProjectId,
        snapshot: ConfigDocument,
        patch: PatchSet,
    ) -> Result<AppliedPatch> {
        if let Err(error) = preflight(&snapshot, &patch) {
            self.cache.invalidate(project_id).await;
            return Err(error);
        }

        if patch.is_empty() {
            tracing::debug!(project_id = project_id.as_str(), "patch is empty; nothing submitted");
            self.cache.put(project_id.clone(), snapshot.clone()).await;
            return Ok(AppliedPatch {
                document: snapshot.clone(),
                snapshot,
                patch,
                warnings: Vec::new(),
            });
        }

        let policy = self.policies.for_patch(&patch);
        let submitted = retry_async(ctx, policy, "patch_config", || {
            self.port
                .patch_config(ctx, project_id.clone(), patch.clone())
        })
        .await;

        match submitted {
            Ok(result) => {
                tracing::debug!(
                    project_id = project_id.as_str(),
                    ops = patch.len(),
                    warnings = result.warnings.len(),
                    "patch applied"
                );
                self.cache
                    .put(project_id.clone(), result.document.clone())
                    .await;
                Ok(AppliedPatch {
                    snapshot,
                    patch,
                    document: result.document,
                    warnings: result.warnings,
                })
            },
            Err(error) => {
                self.cache.invalidate(project_id).await;
                Err(error)
            },
        }
    }
}

fn preflight(snapshot: &ConfigDocument, patch: &PatchSet) -> Result<()> {
    let mut preview = snapshot.clone();
    preview.apply(patch).map_err(|error| {
        let cause = ErrorEnvelope::from(error);
        ErrorEnvelope {
            metadata: cause.metadata,
            ..ErrorEnvelope::expected_with_category(
                ErrorCode::new("patch", "preflight_failed"),
                format!("patch does not apply to the current document: {}", cause.message),
                ErrorCategory::LocalValidation,
            )
        }
        .with_metadata("ops", patch.len().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgmt_client_domain::{PatchOp, PatchPath};
    use mgmt_client_ports::{BoxFuture, ProjectPatchResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn removals_select_the_destructive_policy() -> Result<()> {
        let policies = RetryPolicies::default();
        let append = PatchSet::new(vec![PatchOp::add(
            PatchPath::parse("/services/email/templates/-")?,
            json!({"id": "customer"}),
        )]);
        let removal = PatchSet::new(vec![PatchOp::remove(PatchPath::parse(
            "/services/email/templates/0",
        )?)]);

        assert_eq!(policies.for_patch(&append), RetryPolicy::rate_limit_only());
        assert!(!policies.for_patch(&append).is_eligible(ErrorCategory::TransientServer));
        assert_eq!(
            policies.for_patch(&removal),
            RetryPolicy::rate_limit_or_server_error()
        );
        Ok(())
    }

    /// Serves one fixed document and counts calls.
    #[derive(Default)]
    struct CountingPort {
        fetches: AtomicU32,
        patches: AtomicU32,
    }

    impl ProjectConfigPort for CountingPort {
        fn fetch_config(
            &self,
            _ctx: &RequestContext,
            _project_id: ProjectId,
        ) -> BoxFuture<'_, Result<ConfigDocument>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Ok(ConfigDocument::new(json!({"services": {"email": {"templates": []}}})))
            })
        }

        fn patch_config(
            &self,
            _ctx: &RequestContext,
            _project_id: ProjectId,
            patch: PatchSet,
        ) -> BoxFuture<'_, Result<ProjectPatchResult>> {
            self.patches.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let mut document = ConfigDocument::default();
                document.apply(&patch)?;
                Ok(ProjectPatchResult::new(document))
            })
        }
    }

    #[tokio::test]
    async fn no_op_build_reads_once_and_submits_nothing() -> Result<()> {
        let port = Arc::new(CountingPort::default());
        let applier = ProjectConfigApplier::new(
            Arc::clone(&port) as Arc<dyn ProjectConfigPort>,
            Arc::new(SnapshotCache::disabled()),
            RetryPolicies::default(),
        );
        let project_id = ProjectId::parse("p1")?;

        let applied = applier
            .apply(&RequestContext::new_request(), &project_id, |_| Ok(()))
            .await?;

        assert!(!applied.submitted());
        assert_eq!(applied.document, applied.snapshot);
        assert_eq!(port.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(port.patches.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn patch_that_does_not_replay_is_never_sent() -> Result<()> {
        let port = Arc::new(CountingPort::default());
        let applier = ProjectConfigApplier::new(
            Arc::clone(&port) as Arc<dyn ProjectConfigPort>,
            Arc::new(SnapshotCache::disabled()),
            RetryPolicies::default(),
        );
        let project_id = ProjectId::parse("p1")?;
        let patch = PatchSet::new(vec![PatchOp::remove(PatchPath::parse(
            "/services/email/templates/3",
        )?)]);

        let error = applier
            .apply_ops(&RequestContext::new_request(), &project_id, patch)
            .await
            .err();

        assert_eq!(error.map(|e| e.category), Some(ErrorCategory::LocalValidation));
        assert_eq!(port.patches.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
