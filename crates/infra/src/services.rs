//! Wire the REST client, snapshot cache, retry policies and resolver schedule
//! from one validated config.

use mgmt_client_adapters::DualBackendClient;
use mgmt_client_app::{
    NamedEntryStore, OAuth2ClientStore, ProjectConfigApplier, RetryPolicies, SnapshotCache,
};
use mgmt_client_config::env::{ENV_PROJECT_ID, ENV_WORKSPACE_ID};
use mgmt_client_config::{
    ClientCredentials, RetryConfig, ValidatedClientConfig, ValidatedScope,
    load_client_config_std_env,
};
use mgmt_client_domain::{
    EntryCollection, ProjectId, ProjectSummary, ResolverPolicy, WorkspaceId,
};
use mgmt_client_ports::{OAuth2ClientPort, ProjectConfigPort, WorkspacePort};
use mgmt_client_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, retry_async};
use std::path::Path;
use std::sync::Arc;

/// Retry policies with the configured timings: rate limits only for ordinary
/// calls, rate limits and server errors for destructive ones.
#[must_use]
pub const fn retry_policies(config: &RetryConfig) -> RetryPolicies {
    RetryPolicies {
        standard: config.rate_limit_only(),
        destructive: config.rate_limit_or_server_error(),
    }
}

/// Everything a caller needs to talk to both backends.
///
/// One snapshot cache is shared by every applier handed out, so a read made
/// through one store is reused by the next mutation through another.
#[derive(Clone)]
pub struct ClientServices {
    client: Arc<DualBackendClient>,
    cache: Arc<SnapshotCache>,
    policies: RetryPolicies,
    resolver: ResolverPolicy,
    scope: ValidatedScope,
}

impl ClientServices {
    /// Build the services described by `config`.
    pub fn build(config: &ValidatedClientConfig, credentials: &ClientCredentials) -> Result<Self> {
        let client = DualBackendClient::from_validated(config, credentials)?;
        let services = Self {
            client: Arc::new(client),
            cache: Arc::new(SnapshotCache::from_ttl(config.snapshot_cache.ttl())),
            policies: retry_policies(&config.retry),
            resolver: config.resolver.policy(),
            scope: config.scope().clone(),
        };
        tracing::debug!(
            retry_max_attempts = services.policies.standard.max_attempts,
            resolver_max_attempts = services.resolver.max_attempts,
            snapshot_cache = services.cache.is_enabled(),
            "client services built"
        );
        Ok(services)
    }

    /// Load config and credentials from the process environment and an
    /// optional config file, then build.
    pub fn from_std_env(config_path: Option<&Path>) -> Result<Self> {
        let (config, credentials) = load_client_config_std_env(config_path)?;
        Self::build(&config, &credentials)
    }

    /// Retry policies in use.
    #[must_use]
    pub const fn retry_policies(&self) -> RetryPolicies {
        self.policies
    }

    /// Resolver schedule in use.
    #[must_use]
    pub const fn resolver_policy(&self) -> ResolverPolicy {
        self.resolver
    }

    /// Shared snapshot cache.
    #[must_use]
    pub const fn snapshot_cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Scope identifiers from the config.
    #[must_use]
    pub const fn scope(&self) -> &ValidatedScope {
        &self.scope
    }

    /// The REST client.
    #[must_use]
    pub const fn client(&self) -> &Arc<DualBackendClient> {
        &self.client
    }

    /// Patch applier over the console backend.
    #[must_use]
    pub fn applier(&self) -> ProjectConfigApplier {
        ProjectConfigApplier::new(
            Arc::clone(&self.client) as Arc<dyn ProjectConfigPort>,
            Arc::clone(&self.cache),
            self.policies,
        )
    }

    /// Store for `collection` in `project_id`, or in the configured project
    /// when `project_id` is `None`.
    pub fn named_entries(
        &self,
        project_id: Option<ProjectId>,
        collection: EntryCollection,
    ) -> Result<NamedEntryStore> {
        let project_id = project_id
            .or_else(|| self.scope.project_id.clone())
            .ok_or_else(|| missing_scope("projectId", ENV_PROJECT_ID))?;
        Ok(NamedEntryStore::new(
            self.applier(),
            project_id,
            collection,
            self.resolver,
        ))
    }

    /// OAuth2 client store over the tenant backend.
    #[must_use]
    pub fn oauth2_clients(&self) -> OAuth2ClientStore {
        OAuth2ClientStore::new(
            Arc::clone(&self.client) as Arc<dyn OAuth2ClientPort>,
            self.policies,
        )
    }

    /// Projects of `workspace_id`, or of the configured workspace.
    pub async fn list_projects(
        &self,
        ctx: &RequestContext,
        workspace_id: Option<WorkspaceId>,
    ) -> Result<Vec<ProjectSummary>> {
        let workspace_id = workspace_id
            .or_else(|| self.scope.workspace_id.clone())
            .ok_or_else(|| missing_scope("workspaceId", ENV_WORKSPACE_ID))?;
        let port: &dyn WorkspacePort = self.client.as_ref();
        retry_async(ctx, self.policies.standard, "list_projects", || {
            port.list_projects(ctx, workspace_id.clone())
        })
        .await
    }
}

fn missing_scope(field: &'static str, variable: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("config", "missing_scope"),
        format!("no {field} given and none configured (set scope.{field} or {variable})"),
    )
    .with_metadata("field", field)
}
