//! Dual-backend HTTP client.

use crate::remote::classify::{REQUEST_ID_HEADER, RemoteFailure, classify};
use crate::remote::routing::{Operation, RoutingTable};
use bytes::Bytes;
use mgmt_client_config::{ClientConfig, ClientCredentials, ValidatedClientConfig};
use mgmt_client_domain::Backend;
use mgmt_client_shared::{
    ErrorCategory, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
struct BackendHandle {
    http: reqwest::Client,
}

impl BackendHandle {
    fn new(backend: Backend, token: &SecretString, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    format!("{backend} token contains invalid header characters"),
                )
                .with_metadata("backend", backend.as_str())
            })?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("remote", "client_init_failed"),
                    format!("failed to build {backend} HTTP client: {error}"),
                    ErrorCategory::Other,
                )
                .with_metadata("backend", backend.as_str())
            })?;

        Ok(Self { http })
    }
}

/// Client for the console and tenant backends.
///
/// A backend is usable only when both its base URL and its token are
/// present; calling an operation of an unusable backend fails with
/// `remote:backend_not_configured`.
#[derive(Debug, Clone)]
pub struct DualBackendClient {
    console: Option<BackendHandle>,
    tenant: Option<BackendHandle>,
    routes: RoutingTable,
}

impl DualBackendClient {
    /// Validate `config` and build the client.
    ///
    /// An invalid base URL fails construction with an error naming the backend.
    pub fn new(config: &ClientConfig, credentials: &ClientCredentials) -> Result<Self> {
        let validated = config
            .clone()
            .validate_and_normalize()
            .map_err(ErrorEnvelope::from)?;
        Self::from_validated(&validated, credentials)
    }

    /// Build the client from an already validated config.
    pub fn from_validated(
        config: &ValidatedClientConfig,
        credentials: &ClientCredentials,
    ) -> Result<Self> {
        let mut routes = RoutingTable::seeded()?;
        let mut handles = [None, None];

        for (slot, backend) in handles.iter_mut().zip(Backend::ALL) {
            let Some(base_url) = config.base_url(backend) else {
                continue;
            };
            routes.override_backend(backend, base_url);
            if let Some(token) = credentials.token(backend) {
                let timeout = config.endpoint(backend).timeout();
                *slot = Some(BackendHandle::new(backend, token, timeout)?);
            }
        }

        let [console, tenant] = handles;
        Ok(Self {
            console,
            tenant,
            routes,
        })
    }

    /// Returns true when `backend` has both a base URL and a token.
    #[must_use]
    pub const fn is_configured(&self, backend: Backend) -> bool {
        self.handle(backend).is_some()
    }

    /// Per-operation routing table.
    #[must_use]
    pub const fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Base URL `operation` is sent to.
    #[must_use]
    pub fn effective_base_url(&self, operation: Operation) -> Option<&Url> {
        self.routes.base_url(operation)
    }

    /// Send `operation` and decode its JSON response.
    pub async fn call<B, T>(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        params: &[&str],
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let payload = self.send(ctx, operation, params, body).await?;
        serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("remote", "invalid_response"),
                format!("failed to decode {operation} response: {error}"),
                ErrorCategory::Other,
            )
            .with_metadata("operation", operation.as_str())
        })
    }

    /// Send `operation` and discard its response body.
    pub async fn call_without_response<B>(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        params: &[&str],
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(ctx, operation, params, body).await.map(drop)
    }

    /// Send one request. The response body is always read to completion.
    async fn send<B>(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        params: &[&str],
        body: Option<&B>,
    ) -> Result<Bytes>
    where
        B: Serialize + Sync + ?Sized,
    {
        let label = operation.as_str();
        ctx.ensure_not_cancelled(label)?;
        let backend = operation.backend();
        let handle = self
            .handle(backend)
            .ok_or_else(|| not_configured_error(operation))?;
        let url = self.routes.url(operation, params)?;

        let mut request = handle.http.request(operation.method(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error(label)),
            result = request.send() => result.map_err(|error| transport_error(ctx, operation, &error))?,
        };

        let status = response.status();
        let request_id_header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let payload = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error(label)),
            result = response.bytes() => result.map_err(|error| transport_error(ctx, operation, &error))?,
        };

        if !status.is_success() {
            let descriptor = classify(&RemoteFailure::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&payload).into_owned(),
                request_id_header,
            });
            tracing::debug!(
                operation = label,
                backend = backend.as_str(),
                correlation_id = %ctx.correlation_id(),
                status = status.as_u16(),
                category = %descriptor.category,
                request_id = descriptor.request_id.as_deref(),
                "remote call failed"
            );
            return Err(descriptor.into_envelope(backend, label));
        }

        Ok(payload)
    }

    const fn handle(&self, backend: Backend) -> Option<&BackendHandle> {
        match backend {
            Backend::Console => self.console.as_ref(),
            Backend::Tenant => self.tenant.as_ref(),
        }
    }
}

fn transport_error(
    ctx: &RequestContext,
    operation: Operation,
    error: &reqwest::Error,
) -> ErrorEnvelope {
    let descriptor = classify(&RemoteFailure::from_reqwest(error));
    tracing::debug!(
        operation = operation.as_str(),
        backend = operation.backend().as_str(),
        correlation_id = %ctx.correlation_id(),
        category = %descriptor.category,
        "remote transport failure"
    );
    descriptor.into_envelope(operation.backend(), operation.as_str())
}

fn not_configured_error(operation: Operation) -> ErrorEnvelope {
    let backend = operation.backend();
    ErrorEnvelope::expected(
        ErrorCode::new("remote", "backend_not_configured"),
        format!("{operation} needs the {backend} backend, which has no base URL or token"),
    )
    .with_metadata("backend", backend.as_str())
    .with_metadata("operation", operation.as_str())
}

fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}
