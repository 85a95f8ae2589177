// In-memory project backend shared by the app integration tests.
#![allow(dead_code)]

use mgmt_client_app::RetryPolicies;
use mgmt_client_domain::{ConfigDocument, PatchSet, ProjectId};
use mgmt_client_ports::{BoxFuture, ProjectConfigPort, ProjectPatchResult};
use mgmt_client_shared::{
    ErrorCategory, ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Project document held in memory.
///
/// Patches are applied locally. A configured rename rewrites an entry's id
/// the way a server assigning its own identifiers would, and `stale_reads`
/// makes the next reads after a patch return the pre-patch document.
pub struct InMemoryProject {
    collection_pointer: &'static str,
    state: Mutex<State>,
    pub fetches: AtomicU32,
    pub patch_attempts: AtomicU32,
}

struct State {
    current: ConfigDocument,
    previous: Option<ConfigDocument>,
    stale_reads: u32,
    rename: Option<(String, String)>,
    patch_failures: VecDeque<ErrorEnvelope>,
    accepted: Vec<PatchSet>,
}

impl InMemoryProject {
    pub fn new(collection_pointer: &'static str, document: Value) -> Self {
        Self {
            collection_pointer,
            state: Mutex::new(State {
                current: ConfigDocument::new(document),
                previous: None,
                stale_reads: 0,
                rename: None,
                patch_failures: VecDeque::new(),
                accepted: Vec::new(),
            }),
            fetches: AtomicU32::new(0),
            patch_attempts: AtomicU32::new(0),
        }
    }

    pub fn rename_on_write(self, from: &str, to: &str) -> Self {
        self.state.lock().expect("state").rename = Some((from.to_owned(), to.to_owned()));
        self
    }

    pub fn set_stale_reads(&self, reads: u32) {
        self.state.lock().expect("state").stale_reads = reads;
    }

    /// Overwrite one field of the entry stored under `id`, as another writer would.
    pub fn overwrite_entry_field(&self, id: &str, field: &str, value: Value) {
        let mut state = self.state.lock().expect("state");
        let mut document = state.current.as_value().clone();
        if let Some(Value::Array(items)) = document.pointer_mut(self.collection_pointer) {
            for item in items {
                if item.get("id").and_then(Value::as_str) == Some(id) {
                    item[field] = value.clone();
                }
            }
        }
        state.current = ConfigDocument::new(document);
    }

    pub fn fail_next_patch(&self, error: ErrorEnvelope) {
        self.state.lock().expect("state").patch_failures.push_back(error);
    }

    pub fn accepted(&self) -> Vec<PatchSet> {
        self.state.lock().expect("state").accepted.clone()
    }

    pub fn document(&self) -> Value {
        self.state.lock().expect("state").current.as_value().clone()
    }

    fn rename_entries(&self, document: ConfigDocument, from: &str, to: &str) -> ConfigDocument {
        let mut value = document.into_value();
        if let Some(Value::Array(items)) = value.pointer_mut(self.collection_pointer) {
            for item in items {
                if item.get("id").and_then(Value::as_str) == Some(from) {
                    item["id"] = Value::String(to.to_owned());
                }
            }
        }
        ConfigDocument::new(value)
    }
}

impl ProjectConfigPort for InMemoryProject {
    fn fetch_config(
        &self,
        _ctx: &RequestContext,
        _project_id: ProjectId,
    ) -> BoxFuture<'_, Result<ConfigDocument>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().expect("state");
        let document = match state.previous.clone() {
            Some(previous) if state.stale_reads > 0 => {
                state.stale_reads -= 1;
                previous
            },
            _ => state.current.clone(),
        };
        Box::pin(async move { Ok(document) })
    }

    fn patch_config(
        &self,
        _ctx: &RequestContext,
        _project_id: ProjectId,
        patch: PatchSet,
    ) -> BoxFuture<'_, Result<ProjectPatchResult>> {
        self.patch_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().expect("state");
        if let Some(error) = state.patch_failures.pop_front() {
            return Box::pin(async move { Err(error) });
        }

        let mut next = state.current.clone();
        if let Err(error) = next.apply(&patch) {
            let envelope = ErrorEnvelope::unexpected(
                ErrorCode::new("remote", "other"),
                format!("server rejected patch: {error}"),
                ErrorCategory::Other,
            );
            return Box::pin(async move { Err(envelope) });
        }
        if let Some((from, to)) = state.rename.clone() {
            next = self.rename_entries(next, &from, &to);
        }

        state.previous = Some(std::mem::replace(&mut state.current, next.clone()));
        state.accepted.push(patch);
        Box::pin(async move { Ok(ProjectPatchResult::new(next)) })
    }
}

/// Retry policies with millisecond backoff.
pub fn fast_policies() -> RetryPolicies {
    let fast = |policy: RetryPolicy| RetryPolicy {
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        jitter_ratio_pct: 0,
        ..policy
    };
    RetryPolicies {
        standard: fast(RetryPolicy::rate_limit_only()),
        destructive: fast(RetryPolicy::rate_limit_or_server_error()),
    }
}
