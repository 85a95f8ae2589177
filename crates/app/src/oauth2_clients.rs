//! OAuth2 client administration with retries.

use crate::apply_patch::RetryPolicies;
use mgmt_client_domain::{OAuth2Client, PatchSet};
use mgmt_client_ports::OAuth2ClientPort;
use mgmt_client_shared::{
    ErrorCategory, ErrorCode, ErrorEnvelope, RequestContext, Result, retry_async,
};
use std::sync::Arc;

/// CRUD over the tenant backend's OAuth2 clients.
///
/// Every call goes through the retry executor; deletes also retry transient
/// server failures.
#[derive(Clone)]
pub struct OAuth2ClientStore {
    port: Arc<dyn OAuth2ClientPort>,
    policies: RetryPolicies,
}

impl OAuth2ClientStore {
    /// Create a store.
    pub fn new(port: Arc<dyn OAuth2ClientPort>, policies: RetryPolicies) -> Self {
        Self { port, policies }
    }

    /// Register a client. The returned client carries the server-assigned id.
    pub async fn create(&self, ctx: &RequestContext, client: OAuth2Client) -> Result<OAuth2Client> {
        let created = retry_async(ctx, self.policies.standard, "create_oauth2_client", || {
            self.port.create_client(ctx, client.clone())
        })
        .await?;
        if created.client_id.as_deref().is_none_or(str::is_empty) {
            return Err(ErrorEnvelope::invariant(
                ErrorCode::new("remote", "invalid_response"),
                "create_oauth2_client response carries no client_id",
            ));
        }
        Ok(created)
    }

    /// Fetch one client.
    pub async fn get(&self, ctx: &RequestContext, client_id: &str) -> Result<OAuth2Client> {
        retry_async(ctx, self.policies.standard, "get_oauth2_client", || {
            self.port.get_client(ctx, client_id.into())
        })
        .await
    }

    /// List clients.
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<OAuth2Client>> {
        retry_async(ctx, self.policies.standard, "list_oauth2_clients", || {
            self.port.list_clients(ctx)
        })
        .await
    }

    /// Replace a client.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        client: OAuth2Client,
    ) -> Result<OAuth2Client> {
        retry_async(ctx, self.policies.standard, "update_oauth2_client", || {
            self.port.update_client(ctx, client_id.into(), client.clone())
        })
        .await
    }

    /// Patch a client; patches that remove fields use the destructive policy.
    pub async fn patch(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        patch: PatchSet,
    ) -> Result<OAuth2Client> {
        let policy = self.policies.for_patch(&patch);
        retry_async(ctx, policy, "patch_oauth2_client", || {
            self.port.patch_client(ctx, client_id.into(), patch.clone())
        })
        .await
    }

    /// Delete a client. Deleting a client that is already gone succeeds.
    pub async fn delete(&self, ctx: &RequestContext, client_id: &str) -> Result<()> {
        let deleted = retry_async(ctx, self.policies.destructive, "delete_oauth2_client", || {
            self.port.delete_client(ctx, client_id.into())
        })
        .await;
        match deleted {
            Err(error) if error.category == ErrorCategory::NotFound => {
                tracing::debug!(client_id, "oauth2 client already deleted");
                Ok(())
            },
            other => other,
        }
    }
}
