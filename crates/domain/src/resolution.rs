//! Canonical-identifier resolution model.
//!
//! After a create, the server may store an entry under an identifier that
//! differs from the caller-supplied name. Candidates are derived from a freshly
//! fetched document with ranked strategies; the first ranked candidate wins.

use crate::patch::{ConfigDocument, PatchPath};
use crate::primitives::EntryId;
use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

const BASE64_PREFIX: &str = "base64://";

/// How a payload is stored in an entry's content field.
///
/// Re-encoding the submitted payload with the same encoding yields the
/// fingerprint compared during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FingerprintEncoding {
    /// `base64://` followed by the standard base64 of the compact JSON.
    Base64Json,
    /// Lowercase hex SHA-256 of the compact JSON.
    Sha256Hex,
    /// The payload is stored as-is.
    Verbatim,
}

impl FingerprintEncoding {
    /// Encode `payload` the way the server stores it.
    #[must_use]
    pub fn encode(self, payload: &Value) -> Value {
        let compact = payload.to_string();
        match self {
            Self::Base64Json => Value::String(format!(
                "{BASE64_PREFIX}{}",
                general_purpose::STANDARD.encode(compact.as_bytes())
            )),
            Self::Sha256Hex => {
                let digest = Sha256::digest(compact.as_bytes());
                let hex = digest.iter().fold(String::with_capacity(64), |mut out, byte| {
                    let _ = write!(out, "{byte:02x}");
                    out
                });
                Value::String(hex)
            },
            Self::Verbatim => payload.clone(),
        }
    }

    /// Recover the payload from stored content, when the encoding allows it.
    #[must_use]
    pub fn decode(self, stored: &Value) -> Option<Value> {
        match self {
            Self::Base64Json => {
                let encoded = stored.as_str()?.strip_prefix(BASE64_PREFIX)?;
                let bytes = general_purpose::STANDARD.decode(encoded).ok()?;
                serde_json::from_slice(&bytes).ok()
            },
            Self::Sha256Hex => None,
            Self::Verbatim => Some(stored.clone()),
        }
    }
}

/// Location and shape of a collection of named entries inside a document.
///
/// The collection is an array of objects; each object carries its identifier
/// in `id_field` and its encoded payload in `content_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCollection {
    path: PatchPath,
    id_field: Box<str>,
    content_field: Box<str>,
    encoding: FingerprintEncoding,
}

impl EntryCollection {
    /// Describe a collection.
    pub fn new(
        path: PatchPath,
        id_field: impl Into<Box<str>>,
        content_field: impl Into<Box<str>>,
        encoding: FingerprintEncoding,
    ) -> Self {
        Self {
            path,
            id_field: id_field.into(),
            content_field: content_field.into(),
            encoding,
        }
    }

    /// Array path inside the document.
    #[must_use]
    pub const fn path(&self) -> &PatchPath {
        &self.path
    }

    /// Field holding each entry's identifier.
    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Field holding each entry's encoded payload.
    #[must_use]
    pub fn content_field(&self) -> &str {
        &self.content_field
    }

    /// Content encoding.
    #[must_use]
    pub const fn encoding(&self) -> FingerprintEncoding {
        self.encoding
    }

    /// Entries currently present, in document order.
    pub fn entries<'a>(&self, document: &'a ConfigDocument) -> impl Iterator<Item = &'a Value> {
        document
            .get(&self.path)
            .and_then(Value::as_array)
            .map(|items| items.iter())
            .into_iter()
            .flatten()
    }

    /// Identifier of an entry, when it carries a string id.
    #[must_use]
    pub fn entry_id<'a>(&self, entry: &'a Value) -> Option<&'a str> {
        entry.get(&*self.id_field).and_then(Value::as_str)
    }

    /// All identifiers currently present.
    #[must_use]
    pub fn ids(&self, document: &ConfigDocument) -> BTreeSet<String> {
        self.entries(document)
            .filter_map(|entry| self.entry_id(entry))
            .map(str::to_owned)
            .collect()
    }

    /// Position and value of the entry with identifier `id`.
    #[must_use]
    pub fn find<'a>(&self, document: &'a ConfigDocument, id: &str) -> Option<(usize, &'a Value)> {
        self.entries(document)
            .enumerate()
            .find(|(_, entry)| self.entry_id(entry) == Some(id))
    }

    /// Encoded content the server should hold for `payload`.
    #[must_use]
    pub fn fingerprint(&self, payload: &Value) -> Value {
        self.encoding.encode(payload)
    }

    /// Entry object submitted for `id` and `payload`.
    #[must_use]
    pub fn build_entry(&self, id: &EntryId, payload: &Value) -> Value {
        let mut entry = Map::new();
        entry.insert(self.id_field.to_string(), Value::String(id.as_str().to_owned()));
        entry.insert(self.content_field.to_string(), self.fingerprint(payload));
        Value::Object(entry)
    }

    /// Decoded payload of a stored entry, when the encoding is reversible.
    #[must_use]
    pub fn decode_entry(&self, entry: &Value) -> Option<Value> {
        self.encoding.decode(entry.get(&*self.content_field)?)
    }
}

/// Candidate-matching strategy, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The caller-supplied identifier is present verbatim.
    ExactMatch,
    /// An entry's content equals the re-encoded submitted payload.
    ContentFingerprint,
    /// Exactly one identifier appeared since the pre-mutation snapshot.
    SetDifference,
}

impl ResolutionStrategy {
    /// Every strategy, highest priority first.
    pub const ALL: [Self; 3] = [Self::ExactMatch, Self::ContentFingerprint, Self::SetDifference];

    /// Strategies that need no pre-mutation snapshot.
    pub const VERIFY: [Self; 2] = [Self::ExactMatch, Self::ContentFingerprint];

    /// Priority rank (1 is highest).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::ExactMatch => 1,
            Self::ContentFingerprint => 2,
            Self::SetDifference => 3,
        }
    }

    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::ContentFingerprint => "content_fingerprint",
            Self::SetDifference => "set_difference",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// An identifier proposed by one strategy on one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionCandidate {
    /// Proposed canonical identifier.
    pub id: EntryId,
    /// Strategy that produced it.
    pub strategy: ResolutionStrategy,
    /// Priority rank of the strategy.
    pub rank: u8,
}

impl ResolutionCandidate {
    /// `None` when the stored identifier cannot name an entry.
    fn new(id: &str, strategy: ResolutionStrategy) -> Option<Self> {
        Some(Self {
            id: EntryId::from_stored(id)?,
            strategy,
            rank: strategy.rank(),
        })
    }
}

/// What the caller submitted, used to match against fresh reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionInput {
    /// Caller-supplied identifier.
    pub supplied_id: EntryId,
    /// Submitted payload (before encoding).
    pub payload: Value,
    /// Identifiers present immediately before the mutation.
    pub pre_mutation_ids: BTreeSet<String>,
}

/// Run `strategies` against `document` and return every candidate, best first.
///
/// Fingerprint matches on identifiers that are new since the pre-mutation
/// snapshot sort before matches on identifiers that already existed. Stored
/// identifiers that cannot name an entry (empty) never become candidates.
#[must_use]
pub fn rank_candidates(
    collection: &EntryCollection,
    document: &ConfigDocument,
    input: &ResolutionInput,
    strategies: &[ResolutionStrategy],
) -> Vec<ResolutionCandidate> {
    let mut candidates = Vec::new();

    if strategies.contains(&ResolutionStrategy::ExactMatch)
        && collection.find(document, input.supplied_id.as_str()).is_some()
    {
        candidates.extend(ResolutionCandidate::new(
            input.supplied_id.as_str(),
            ResolutionStrategy::ExactMatch,
        ));
    }

    if strategies.contains(&ResolutionStrategy::ContentFingerprint) {
        let fingerprint = collection.fingerprint(&input.payload);
        let mut matches: Vec<&str> = collection
            .entries(document)
            .filter(|entry| entry.get(collection.content_field()) == Some(&fingerprint))
            .filter_map(|entry| collection.entry_id(entry))
            .collect();
        matches.sort_by_key(|id| input.pre_mutation_ids.contains(*id));
        candidates.extend(
            matches
                .into_iter()
                .filter_map(|id| ResolutionCandidate::new(id, ResolutionStrategy::ContentFingerprint)),
        );
    }

    if strategies.contains(&ResolutionStrategy::SetDifference) {
        let current = collection.ids(document);
        let mut added = current.difference(&input.pre_mutation_ids);
        if let (Some(only), None) = (added.next(), added.next()) {
            candidates.extend(ResolutionCandidate::new(
                only.as_str(),
                ResolutionStrategy::SetDifference,
            ));
        }
    }

    candidates.sort_by_key(|candidate| candidate.rank);
    candidates
}

/// First candidate produced by `strategies`, if any.
#[must_use]
pub fn best_candidate(
    collection: &EntryCollection,
    document: &ConfigDocument,
    input: &ResolutionInput,
    strategies: &[ResolutionStrategy],
) -> Option<ResolutionCandidate> {
    rank_candidates(collection, document, input, strategies)
        .into_iter()
        .next()
}

/// Poll schedule for canonical-id resolution.
///
/// Tick 1 runs immediately; tick `n > 1` waits `delay_before(n)` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Maximum poll ticks, including the first.
    pub max_attempts: u32,
    /// Delay before the second tick (ms).
    pub initial_delay_ms: u64,
    /// Growth factor between ticks.
    pub multiplier: u32,
    /// Cap for any single delay (ms).
    pub max_delay_ms: u64,
}

impl ResolverPolicy {
    /// Default tick budget.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;
    /// Default delay before the second tick (ms).
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
    /// Default growth factor.
    pub const DEFAULT_MULTIPLIER: u32 = 2;
    /// Default delay cap (ms).
    pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

    /// Delay to wait before the given tick (1-based). Zero for the first tick.
    #[must_use]
    pub fn delay_before(&self, tick: u32) -> Duration {
        if tick <= 1 {
            return Duration::ZERO;
        }
        let mut delay = self.initial_delay_ms;
        for _ in 2..tick {
            delay = delay.saturating_mul(u64::from(self.multiplier.max(1)));
            if delay >= self.max_delay_ms {
                break;
            }
        }
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: Self::DEFAULT_INITIAL_DELAY_MS,
            multiplier: Self::DEFAULT_MULTIPLIER,
            max_delay_ms: Self::DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// How a resolver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    /// A strategy matched.
    Resolved,
    /// Attempts exhausted; the supplied identifier was used unverified.
    FallbackUsed,
    /// Cancelled while polling.
    Cancelled,
}

impl ResolutionState {
    /// Stable label for logs and error metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::FallbackUsed => "fallback_used",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Warning attached to an otherwise successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionWarning {
    /// Resolution exhausted its attempts and fell back to the supplied id.
    FallbackUsed {
        /// Identifier used without verification.
        supplied_id: EntryId,
        /// Poll ticks spent.
        attempts: u32,
    },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallbackUsed {
                supplied_id,
                attempts,
            } => write!(
                formatter,
                "could not confirm the canonical identifier for `{supplied_id}` after {attempts} \
                 attempts; using the supplied identifier unverified"
            ),
        }
    }
}

/// Terminal result of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// Identifier to track from now on.
    pub canonical_id: EntryId,
    /// `Resolved` or `FallbackUsed`.
    pub state: ResolutionState,
    /// Strategy that matched (absent on fallback).
    pub strategy: Option<ResolutionStrategy>,
    /// Poll ticks spent.
    pub attempts: u32,
    /// Warning to surface alongside the result.
    pub warning: Option<ResolutionWarning>,
}

impl ResolutionOutcome {
    /// Outcome for a matched candidate.
    #[must_use]
    pub const fn resolved(canonical_id: EntryId, strategy: ResolutionStrategy, attempts: u32) -> Self {
        Self {
            canonical_id,
            state: ResolutionState::Resolved,
            strategy: Some(strategy),
            attempts,
            warning: None,
        }
    }

    /// Outcome after exhausting every attempt.
    #[must_use]
    pub fn fallback(supplied_id: EntryId, attempts: u32) -> Self {
        Self {
            canonical_id: supplied_id.clone(),
            state: ResolutionState::FallbackUsed,
            strategy: None,
            attempts,
            warning: Some(ResolutionWarning::FallbackUsed {
                supplied_id,
                attempts,
            }),
        }
    }

    /// Returns true when a strategy confirmed the identifier.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self.state, ResolutionState::Resolved)
    }
}
