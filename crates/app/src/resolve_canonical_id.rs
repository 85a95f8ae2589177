//! Poll fresh reads until a just-written entry's canonical identifier is known.

use mgmt_client_domain::{
    EntryCollection, EntryId, ProjectId, ResolutionInput, ResolutionOutcome, ResolutionState,
    ResolutionStrategy, ResolverPolicy, best_candidate,
};
use mgmt_client_ports::ProjectConfigPort;
use mgmt_client_shared::{ErrorCategory, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::time::Duration;

/// What to resolve and how.
#[derive(Debug, Clone, Copy)]
pub struct ResolveCanonicalIdInput<'a> {
    /// Project whose document holds the collection.
    pub project_id: &'a ProjectId,
    /// Collection the entry was written to.
    pub collection: &'a EntryCollection,
    /// Submitted identifier, payload and pre-mutation identifiers.
    pub resolution: &'a ResolutionInput,
    /// Strategies to run on every tick, any order.
    pub strategies: &'a [ResolutionStrategy],
}

/// Resolve the canonical identifier of an entry written moments ago.
///
/// Every tick fetches the document from the server; the snapshot cache is
/// never consulted. Exhausting the tick budget is not an error: the outcome
/// falls back to the supplied identifier and carries a warning. Cancellation
/// while polling fails with `ResolutionCancelled`.
pub async fn resolve_canonical_id(
    ctx: &RequestContext,
    port: &dyn ProjectConfigPort,
    input: ResolveCanonicalIdInput<'_>,
    policy: ResolverPolicy,
) -> Result<ResolutionOutcome> {
    let supplied_id = &input.resolution.supplied_id;
    let max_attempts = policy.max_attempts.max(1);

    for tick in 1..=max_attempts {
        wait_for_tick(ctx, policy.delay_before(tick), supplied_id, tick).await?;

        let document = match port.fetch_config(ctx, input.project_id.clone()).await {
            Ok(document) => document,
            Err(error) if error.is_cancelled() => {
                return Err(cancelled_error(supplied_id, tick));
            },
            Err(error)
                if error.category.is_transient() || error.category == ErrorCategory::NotFound =>
            {
                tracing::debug!(
                    supplied_id = supplied_id.as_str(),
                    tick,
                    category = %error.category,
                    "resolver read failed; counting as a missed tick"
                );
                continue;
            },
            Err(error) => return Err(error),
        };

        if let Some(candidate) =
            best_candidate(input.collection, &document, input.resolution, input.strategies)
        {
            let canonical_id = candidate.id;
            tracing::debug!(
                supplied_id = supplied_id.as_str(),
                canonical_id = canonical_id.as_str(),
                strategy = %candidate.strategy,
                tick,
                "canonical identifier resolved"
            );
            return Ok(ResolutionOutcome::resolved(
                canonical_id,
                candidate.strategy,
                tick,
            ));
        }

        tracing::debug!(
            supplied_id = supplied_id.as_str(),
            tick,
            max_attempts,
            "no resolution strategy matched"
        );
    }

    let outcome = ResolutionOutcome::fallback(supplied_id.clone(), max_attempts);
    if let Some(warning) = outcome.warning.as_ref() {
        tracing::warn!(
            supplied_id = supplied_id.as_str(),
            attempts = max_attempts,
            "{warning}"
        );
    }
    Ok(outcome)
}

async fn wait_for_tick(
    ctx: &RequestContext,
    delay: Duration,
    supplied_id: &EntryId,
    tick: u32,
) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(cancelled_error(supplied_id, tick));
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(supplied_id, tick)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn cancelled_error(supplied_id: &EntryId, tick: u32) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_category(
        ErrorCode::new("resolver", "cancelled"),
        format!("resolution of `{supplied_id}` was cancelled"),
        ErrorCategory::ResolutionCancelled,
    )
    .with_metadata("supplied_id", supplied_id.as_str())
    .with_metadata("state", ResolutionState::Cancelled.as_str())
    .with_metadata("tick", tick.to_string())
}
