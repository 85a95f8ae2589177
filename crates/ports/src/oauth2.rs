//! Tenant boundary: OAuth2 client administration.

use crate::BoxFuture;
use mgmt_client_domain::{OAuth2Client, PatchSet};
use mgmt_client_shared::{RequestContext, Result};

/// CRUD over OAuth2 clients on the tenant backend.
pub trait OAuth2ClientPort: Send + Sync {
    /// Register a client; the response carries the server-assigned id.
    fn create_client(
        &self,
        ctx: &RequestContext,
        client: OAuth2Client,
    ) -> BoxFuture<'_, Result<OAuth2Client>>;

    /// Fetch one client.
    fn get_client(
        &self,
        ctx: &RequestContext,
        client_id: Box<str>,
    ) -> BoxFuture<'_, Result<OAuth2Client>>;

    /// List clients.
    fn list_clients(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<OAuth2Client>>>;

    /// Replace a client.
    fn update_client(
        &self,
        ctx: &RequestContext,
        client_id: Box<str>,
        client: OAuth2Client,
    ) -> BoxFuture<'_, Result<OAuth2Client>>;

    /// Patch a client in place.
    fn patch_client(
        &self,
        ctx: &RequestContext,
        client_id: Box<str>,
        patch: PatchSet,
    ) -> BoxFuture<'_, Result<OAuth2Client>>;

    /// Delete a client.
    fn delete_client(&self, ctx: &RequestContext, client_id: Box<str>) -> BoxFuture<'_, Result<()>>;
}
