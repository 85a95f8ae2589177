//! Console port implementations.

use crate::remote::client::DualBackendClient;
use crate::remote::routing::Operation;
use mgmt_client_domain::{ConfigDocument, PatchSet, ProjectId, ProjectSummary, WorkspaceId};
use mgmt_client_ports::{BoxFuture, ProjectConfigPort, ProjectPatchResult, WorkspacePort};
use mgmt_client_shared::{RequestContext, Result};
use serde::Deserialize;
use serde_json::Value;

/// Answer of `PATCH /projects/{id}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PatchResponse {
    Wrapped(WrappedProject),
    Bare(Value),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WrappedProject {
    project: Value,
    #[serde(default)]
    warnings: Vec<ServerWarning>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerWarning {
    Text(String),
    Structured { message: String },
}

impl ServerWarning {
    fn into_message(self) -> Box<str> {
        match self {
            Self::Text(message) | Self::Structured { message } => message.into_boxed_str(),
        }
    }
}

impl PatchResponse {
    fn into_result(self) -> ProjectPatchResult {
        match self {
            Self::Wrapped(wrapped) => ProjectPatchResult {
                document: ConfigDocument::new(wrapped.project),
                warnings: wrapped
                    .warnings
                    .into_iter()
                    .map(ServerWarning::into_message)
                    .collect(),
            },
            Self::Bare(value) => ProjectPatchResult::new(ConfigDocument::new(value)),
        }
    }
}

/// Answer of `GET /workspaces/{id}/projects`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectList {
    Plain(Vec<ProjectSummary>),
    Wrapped { projects: Vec<ProjectSummary> },
}

impl ProjectList {
    fn into_vec(self) -> Vec<ProjectSummary> {
        match self {
            Self::Plain(projects) | Self::Wrapped { projects } => projects,
        }
    }
}

impl ProjectConfigPort for DualBackendClient {
    fn fetch_config(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> BoxFuture<'_, Result<ConfigDocument>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let document: Value = self
                .call::<(), _>(&ctx, Operation::GetProject, &[project_id.as_str()], None)
                .await?;
            Ok(ConfigDocument::new(document))
        })
    }

    fn patch_config(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        patch: PatchSet,
    ) -> BoxFuture<'_, Result<ProjectPatchResult>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let response: PatchResponse = self
                .call(
                    &ctx,
                    Operation::PatchProject,
                    &[project_id.as_str()],
                    Some(&patch),
                )
                .await?;
            let result = response.into_result();
            for warning in &result.warnings {
                tracing::warn!(
                    project_id = project_id.as_str(),
                    ops = patch.len(),
                    warning = %warning,
                    "project patch accepted with warning"
                );
            }
            Ok(result)
        })
    }
}

impl WorkspacePort for DualBackendClient {
    fn list_projects(
        &self,
        ctx: &RequestContext,
        workspace_id: WorkspaceId,
    ) -> BoxFuture<'_, Result<Vec<ProjectSummary>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let projects: ProjectList = self
                .call::<(), _>(
                    &ctx,
                    Operation::ListProjects,
                    &[workspace_id.as_str()],
                    None,
                )
                .await?;
            Ok(projects.into_vec())
        })
    }
}
