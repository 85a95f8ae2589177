//! Console boundary: project configuration documents and workspace listing.

use crate::BoxFuture;
use mgmt_client_domain::{ConfigDocument, PatchSet, ProjectId, ProjectSummary, WorkspaceId};
use mgmt_client_shared::{RequestContext, Result};

/// Result of a successful project patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPatchResult {
    /// Project document after the server applied the patch.
    pub document: ConfigDocument,
    /// Non-fatal warnings the server attached to the response.
    pub warnings: Vec<Box<str>>,
}

impl ProjectPatchResult {
    /// A result without warnings.
    #[must_use]
    pub const fn new(document: ConfigDocument) -> Self {
        Self {
            document,
            warnings: Vec::new(),
        }
    }
}

/// Read and patch a project's nested configuration document.
pub trait ProjectConfigPort: Send + Sync {
    /// Fetch the current document. Implementations never serve cached data.
    fn fetch_config(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> BoxFuture<'_, Result<ConfigDocument>>;

    /// Submit an ordered patch in a single request.
    fn patch_config(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        patch: PatchSet,
    ) -> BoxFuture<'_, Result<ProjectPatchResult>>;
}

/// List the projects of a workspace.
pub trait WorkspacePort: Send + Sync {
    /// Projects visible to the console credential in `workspace_id`.
    fn list_projects(
        &self,
        ctx: &RequestContext,
        workspace_id: WorkspaceId,
    ) -> BoxFuture<'_, Result<Vec<ProjectSummary>>>;
}
