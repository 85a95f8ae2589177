//! Operation catalogue and per-operation base-URL routing.

use mgmt_client_domain::Backend;
use mgmt_client_shared::{ErrorCode, ErrorEnvelope, Result};
use reqwest::Method;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Seed URL for console operations before configuration is applied.
pub const DEFAULT_CONSOLE_ROUTE: &str = "https://api.console.example.com";
/// Seed URL for tenant operations before configuration is applied.
pub const DEFAULT_TENANT_ROUTE: &str = "https://tenant.example.com";

/// Every remote call the client knows how to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// `GET /projects/{project_id}`.
    GetProject,
    /// `PATCH /projects/{project_id}`.
    PatchProject,
    /// `GET /workspaces/{workspace_id}/projects`.
    ListProjects,
    /// `POST /admin/clients`.
    CreateOAuth2Client,
    /// `GET /admin/clients`.
    ListOAuth2Clients,
    /// `GET /admin/clients/{id}`.
    GetOAuth2Client,
    /// `PUT /admin/clients/{id}`.
    UpdateOAuth2Client,
    /// `PATCH /admin/clients/{id}`.
    PatchOAuth2Client,
    /// `DELETE /admin/clients/{id}`.
    DeleteOAuth2Client,
}

impl Operation {
    /// Every operation, console first.
    pub const ALL: [Self; 9] = [
        Self::GetProject,
        Self::PatchProject,
        Self::ListProjects,
        Self::CreateOAuth2Client,
        Self::ListOAuth2Clients,
        Self::GetOAuth2Client,
        Self::UpdateOAuth2Client,
        Self::PatchOAuth2Client,
        Self::DeleteOAuth2Client,
    ];

    /// Backend serving this operation.
    #[must_use]
    pub const fn backend(self) -> Backend {
        match self {
            Self::GetProject | Self::PatchProject | Self::ListProjects => Backend::Console,
            Self::CreateOAuth2Client
            | Self::ListOAuth2Clients
            | Self::GetOAuth2Client
            | Self::UpdateOAuth2Client
            | Self::PatchOAuth2Client
            | Self::DeleteOAuth2Client => Backend::Tenant,
        }
    }

    /// HTTP method.
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::GetProject | Self::ListProjects | Self::ListOAuth2Clients | Self::GetOAuth2Client => {
                Method::GET
            },
            Self::PatchProject | Self::PatchOAuth2Client => Method::PATCH,
            Self::CreateOAuth2Client => Method::POST,
            Self::UpdateOAuth2Client => Method::PUT,
            Self::DeleteOAuth2Client => Method::DELETE,
        }
    }

    /// Path template relative to the backend base URL.
    #[must_use]
    pub const fn path_template(self) -> &'static str {
        match self {
            Self::GetProject | Self::PatchProject => "/projects/{project_id}",
            Self::ListProjects => "/workspaces/{workspace_id}/projects",
            Self::CreateOAuth2Client | Self::ListOAuth2Clients => "/admin/clients",
            Self::GetOAuth2Client
            | Self::UpdateOAuth2Client
            | Self::PatchOAuth2Client
            | Self::DeleteOAuth2Client => "/admin/clients/{id}",
        }
    }

    /// Stable label for logs and error metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetProject => "get_project",
            Self::PatchProject => "patch_project",
            Self::ListProjects => "list_projects",
            Self::CreateOAuth2Client => "create_oauth2_client",
            Self::ListOAuth2Clients => "list_oauth2_clients",
            Self::GetOAuth2Client => "get_oauth2_client",
            Self::UpdateOAuth2Client => "update_oauth2_client",
            Self::PatchOAuth2Client => "patch_oauth2_client",
            Self::DeleteOAuth2Client => "delete_oauth2_client",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Base URL per operation.
///
/// Seeded with hardcoded defaults; [`RoutingTable::override_backend`]
/// replaces the entry of every operation served by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: BTreeMap<Operation, Url>,
}

impl RoutingTable {
    /// Table holding the default route of every operation.
    pub fn seeded() -> Result<Self> {
        let console = parse_seed(DEFAULT_CONSOLE_ROUTE)?;
        let tenant = parse_seed(DEFAULT_TENANT_ROUTE)?;
        let routes = Operation::ALL
            .into_iter()
            .map(|operation| {
                let url = match operation.backend() {
                    Backend::Console => console.clone(),
                    Backend::Tenant => tenant.clone(),
                };
                (operation, url)
            })
            .collect();
        Ok(Self { routes })
    }

    /// Point every operation of `backend` at `base_url`.
    pub fn override_backend(&mut self, backend: Backend, base_url: &Url) {
        for operation in Operation::ALL {
            if operation.backend() == backend {
                self.routes.insert(operation, base_url.clone());
            }
        }
    }

    /// Base URL currently routed for `operation`.
    #[must_use]
    pub fn base_url(&self, operation: Operation) -> Option<&Url> {
        self.routes.get(&operation)
    }

    /// Full request URL with `params` substituted into the path template in order.
    ///
    /// Parameters are percent-encoded as single path segments.
    pub fn url(&self, operation: Operation, params: &[&str]) -> Result<Url> {
        let mut url = self
            .base_url(operation)
            .cloned()
            .ok_or_else(|| route_error(operation, "no route registered"))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| route_error(operation, "base URL cannot carry a path"))?;
            segments.pop_if_empty();
            let mut params = params.iter();
            for part in operation.path_template().trim_start_matches('/').split('/') {
                if part.starts_with('{') {
                    let value = params
                        .next()
                        .ok_or_else(|| route_error(operation, "missing path parameter"))?;
                    segments.push(value);
                } else {
                    segments.push(part);
                }
            }
        }
        Ok(url)
    }
}

fn parse_seed(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|error| {
        ErrorEnvelope::invariant(
            ErrorCode::new("remote", "invalid_default_route"),
            format!("default route is not a URL: {error}"),
        )
    })
}

fn route_error(operation: Operation, reason: &str) -> ErrorEnvelope {
    ErrorEnvelope::invariant(
        ErrorCode::new("remote", "invalid_route"),
        format!("cannot build URL for {operation}: {reason}"),
    )
    .with_metadata("operation", operation.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_table_routes_every_operation() -> Result<()> {
        let table = RoutingTable::seeded()?;
        for operation in Operation::ALL {
            assert!(table.base_url(operation).is_some(), "{operation} unrouted");
        }
        Ok(())
    }

    #[test]
    fn override_replaces_every_entry_of_one_backend() -> Result<()> {
        let mut table = RoutingTable::seeded()?;
        let tenant = Url::parse("http://127.0.0.1:9999").map_err(|error| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string())
        })?;
        table.override_backend(Backend::Tenant, &tenant);

        for operation in Operation::ALL {
            let host = table.base_url(operation).and_then(Url::host_str);
            match operation.backend() {
                Backend::Tenant => assert_eq!(host, Some("127.0.0.1")),
                Backend::Console => assert_eq!(host, Some("api.console.example.com")),
            }
        }
        Ok(())
    }

    #[test]
    fn url_substitutes_and_encodes_parameters() -> Result<()> {
        let mut table = RoutingTable::seeded()?;
        let base = Url::parse("https://tenant.test/api/").map_err(|error| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string())
        })?;
        table.override_backend(Backend::Tenant, &base);

        let url = table.url(Operation::GetOAuth2Client, &["a b/c"])?;
        assert_eq!(url.as_str(), "https://tenant.test/api/admin/clients/a%20b%2Fc");

        let list = table.url(Operation::ListOAuth2Clients, &[])?;
        assert_eq!(list.as_str(), "https://tenant.test/api/admin/clients");
        Ok(())
    }

    #[test]
    fn missing_parameter_is_an_invariant_error() -> Result<()> {
        let table = RoutingTable::seeded()?;
        let error = table.url(Operation::GetProject, &[]).err();
        assert!(matches!(
            error,
            Some(ref envelope) if envelope.code == ErrorCode::new("remote", "invalid_route")
        ));
        Ok(())
    }

    #[test]
    fn catalogue_matches_route_table() {
        assert_eq!(Operation::ListProjects.method(), Method::GET);
        assert_eq!(Operation::UpdateOAuth2Client.method(), Method::PUT);
        assert_eq!(Operation::DeleteOAuth2Client.backend(), Backend::Tenant);
        assert_eq!(Operation::PatchProject.backend(), Backend::Console);
        assert_eq!(
            Operation::ListProjects.path_template(),
            "/workspaces/{workspace_id}/projects"
        );
    }
}
