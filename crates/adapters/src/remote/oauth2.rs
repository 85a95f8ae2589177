//! Tenant port implementation.

use crate::remote::client::DualBackendClient;
use crate::remote::routing::Operation;
use mgmt_client_domain::{OAuth2Client, PatchSet};
use mgmt_client_ports::{BoxFuture, OAuth2ClientPort};
use mgmt_client_shared::{RequestContext, Result};

impl OAuth2ClientPort for DualBackendClient {
    fn create_client(
        &self,
        ctx: &RequestContext,
        client: OAuth2Client,
    ) -> BoxFuture<'_, Result<OAuth2Client>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.call(&ctx, Operation::CreateOAuth2Client, &[], Some(&client))
                .await
        })
    }

    fn get_client(
        &self,
        ctx: &RequestContext,
        client_id: Box<str>,
    ) -> BoxFuture<'_, Result<OAuth2Client>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.call::<(), _>(&ctx, Operation::GetOAuth2Client, &[&*client_id], None)
                .await
        })
    }

    fn list_clients(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<OAuth2Client>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.call::<(), _>(&ctx, Operation::ListOAuth2Clients, &[], None)
                .await
        })
    }

    fn update_client(
        &self,
        ctx: &RequestContext,
        client_id: Box<str>,
        client: OAuth2Client,
    ) -> BoxFuture<'_, Result<OAuth2Client>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.call(
                &ctx,
                Operation::UpdateOAuth2Client,
                &[&*client_id],
                Some(&client),
            )
            .await
        })
    }

    fn patch_client(
        &self,
        ctx: &RequestContext,
        client_id: Box<str>,
        patch: PatchSet,
    ) -> BoxFuture<'_, Result<OAuth2Client>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.call(
                &ctx,
                Operation::PatchOAuth2Client,
                &[&*client_id],
                Some(&patch),
            )
            .await
        })
    }

    fn delete_client(&self, ctx: &RequestContext, client_id: Box<str>) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.call_without_response::<()>(
                &ctx,
                Operation::DeleteOAuth2Client,
                &[&*client_id],
                None,
            )
            .await
        })
    }
}
