//! Path-addressed patch operations over a nested configuration document.
//!
//! Only the subset of JSON Patch the management API accepts is modelled:
//! `add`, `replace` and `remove`, with object keys, numeric array indices and
//! the tail-append sentinel `-` as path segments.

use mgmt_client_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Failures while parsing paths or applying patch operations locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// The path string is not a valid pointer.
    #[error("invalid patch path `{path}`: {reason}")]
    InvalidPath {
        /// Raw path input.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },
    /// A deep `add` was attempted under a container that does not exist.
    #[error("cannot add at `{path}`: parent container does not exist")]
    MissingParent {
        /// Target path of the rejected op.
        path: String,
    },
    /// `replace` or `remove` addressed a value that does not exist.
    #[error("no value at `{path}`")]
    MissingTarget {
        /// Target path of the rejected op.
        path: String,
    },
    /// The parent of the target is a scalar.
    #[error("cannot descend into scalar at `{path}`")]
    NotAContainer {
        /// Path of the scalar.
        path: String,
    },
    /// An array was addressed with a non-numeric segment.
    #[error("`{path}` addresses an array with a non-index segment")]
    InvalidArrayIndex {
        /// Target path of the rejected op.
        path: String,
    },
    /// A numeric index is past the end of the array.
    #[error("index {index} is out of bounds at `{path}` (length {len})")]
    IndexOutOfBounds {
        /// Target path of the rejected op.
        path: String,
        /// Requested index.
        index: usize,
        /// Current array length.
        len: usize,
    },
    /// The `-` sentinel is only meaningful for `add`.
    #[error("`-` is only valid for add (got {op} at `{path}`)")]
    AppendNotAllowed {
        /// Operation that used the sentinel.
        op: PatchOpKind,
        /// Target path of the rejected op.
        path: String,
    },
    /// `add` and `replace` carry a value.
    #[error("{op} at `{path}` requires a value")]
    MissingValue {
        /// Operation missing its value.
        op: PatchOpKind,
        /// Target path of the rejected op.
        path: String,
    },
    /// `remove` must not carry a value.
    #[error("remove at `{path}` must not carry a value")]
    UnexpectedValue {
        /// Target path of the rejected op.
        path: String,
    },
    /// The document root cannot be removed.
    #[error("the document root cannot be removed")]
    RootRemoval,
}

impl PatchError {
    fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::InvalidPath { .. } => "invalid_path",
            Self::MissingParent { .. } => "missing_parent",
            Self::MissingTarget { .. } => "missing_target",
            Self::NotAContainer { .. } => "not_a_container",
            Self::InvalidArrayIndex { .. } | Self::IndexOutOfBounds { .. } => "invalid_index",
            Self::AppendNotAllowed { .. } => "append_not_allowed",
            Self::MissingValue { .. } | Self::UnexpectedValue { .. } => "invalid_value",
            Self::RootRemoval => "root_removal",
        };
        ErrorCode::new("patch", code)
    }

    fn path(&self) -> Option<&str> {
        match self {
            Self::InvalidPath { path, .. }
            | Self::MissingParent { path }
            | Self::MissingTarget { path }
            | Self::NotAContainer { path }
            | Self::InvalidArrayIndex { path }
            | Self::IndexOutOfBounds { path, .. }
            | Self::AppendNotAllowed { path, .. }
            | Self::MissingValue { path, .. }
            | Self::UnexpectedValue { path } => Some(path.as_str()),
            Self::RootRemoval => None,
        }
    }
}

impl From<PatchError> for ErrorEnvelope {
    fn from(error: PatchError) -> Self {
        let mut envelope = Self::expected(error.error_code(), error.to_string());
        if let Some(path) = error.path() {
            envelope = envelope.with_metadata("path", path);
        }
        envelope
    }
}

/// One segment of a patch path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object member name (unescaped).
    Key(String),
    /// Array position; on objects it is treated as the decimal key.
    Index(usize),
    /// Tail-append sentinel `-`.
    Append,
}

impl PathSegment {
    /// Build a key segment.
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    fn parse(raw: &str) -> Self {
        if raw == "-" {
            return Self::Append;
        }
        let canonical_number =
            raw == "0" || (!raw.starts_with('0') && raw.bytes().all(|b| b.is_ascii_digit()));
        if !raw.is_empty() && canonical_number {
            if let Ok(index) = raw.parse::<usize>() {
                return Self::Index(index);
            }
        }
        Self::Key(raw.replace("~1", "/").replace("~0", "~"))
    }

    /// Member name used when this segment addresses an object.
    fn as_key(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Index(index) => index.to_string(),
            Self::Append => "-".to_owned(),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => formatter.write_str(&key.replace('~', "~0").replace('/', "~1")),
            Self::Index(index) => write!(formatter, "{index}"),
            Self::Append => formatter.write_str("-"),
        }
    }
}

/// Slash-delimited pointer into a [`ConfigDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PatchPath(Vec<PathSegment>);

impl PatchPath {
    /// The document root (empty pointer).
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a pointer such as `/services/identity/config/courier`.
    pub fn parse(input: &str) -> Result<Self, PatchError> {
        if input.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = input.strip_prefix('/') else {
            return Err(PatchError::InvalidPath {
                path: input.to_owned(),
                reason: "must start with '/'",
            });
        };
        if has_dangling_escape(rest) {
            return Err(PatchError::InvalidPath {
                path: input.to_owned(),
                reason: "'~' must be followed by '0' or '1'",
            });
        }
        let segments: Vec<PathSegment> = rest.split('/').map(PathSegment::parse).collect();
        let append_before_end = segments
            .iter()
            .rev()
            .skip(1)
            .any(|segment| matches!(segment, PathSegment::Append));
        if append_before_end {
            return Err(PatchError::InvalidPath {
                path: input.to_owned(),
                reason: "'-' may only appear as the last segment",
            });
        }
        Ok(Self(segments))
    }

    /// Return a copy of this path extended by an object key.
    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        self.join(PathSegment::Key(key.into()))
    }

    /// Return a copy of this path extended by an array index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        self.join(PathSegment::Index(index))
    }

    /// Return a copy of this path extended by the tail-append sentinel.
    #[must_use]
    pub fn append(&self) -> Self {
        self.join(PathSegment::Append)
    }

    /// Return a copy of this path extended by `segment`.
    #[must_use]
    pub fn join(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// Path segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns true for the document root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into parent path and last segment.
    #[must_use]
    pub fn split_last(&self) -> Option<(Self, &PathSegment)> {
        let (last, parent) = self.0.split_last()?;
        Some((Self(parent.to_vec()), last))
    }

    /// Prefix made of the first `len` segments.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }

    /// Returns true when the last segment is the append sentinel.
    #[must_use]
    pub fn ends_with_append(&self) -> bool {
        matches!(self.0.last(), Some(PathSegment::Append))
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(formatter, "/{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for PatchPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PatchPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn has_dangling_escape(raw: &str) -> bool {
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '~' && !matches!(chars.peek(), Some('0' | '1')) {
            return true;
        }
    }
    false
}

/// Patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    /// Insert or overwrite a member, insert into an array.
    Add,
    /// Overwrite an existing value.
    Replace,
    /// Delete an existing value.
    Remove,
}

impl fmt::Display for PatchOpKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => formatter.write_str("add"),
            Self::Replace => formatter.write_str("replace"),
            Self::Remove => formatter.write_str("remove"),
        }
    }
}

/// One `{op, path, value}` instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPatchOp")]
pub struct PatchOp {
    op: PatchOpKind,
    path: PatchPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

#[derive(Deserialize)]
struct RawPatchOp {
    op: PatchOpKind,
    path: PatchPath,
    #[serde(default)]
    value: Option<Value>,
}

impl TryFrom<RawPatchOp> for PatchOp {
    type Error = PatchError;

    fn try_from(raw: RawPatchOp) -> Result<Self, Self::Error> {
        let op = Self {
            op: raw.op,
            path: raw.path,
            value: raw.value,
        };
        op.validate()?;
        Ok(op)
    }
}

impl PatchOp {
    /// `add` at `path`.
    #[must_use]
    pub const fn add(path: PatchPath, value: Value) -> Self {
        Self {
            op: PatchOpKind::Add,
            path,
            value: Some(value),
        }
    }

    /// `replace` at `path`.
    #[must_use]
    pub const fn replace(path: PatchPath, value: Value) -> Self {
        Self {
            op: PatchOpKind::Replace,
            path,
            value: Some(value),
        }
    }

    /// `remove` at `path`.
    #[must_use]
    pub const fn remove(path: PatchPath) -> Self {
        Self {
            op: PatchOpKind::Remove,
            path,
            value: None,
        }
    }

    /// Operation kind.
    #[must_use]
    pub const fn kind(&self) -> PatchOpKind {
        self.op
    }

    /// Target path.
    #[must_use]
    pub const fn path(&self) -> &PatchPath {
        &self.path
    }

    /// Carried value (absent for `remove`).
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    fn validate(&self) -> Result<(), PatchError> {
        match (self.op, &self.value) {
            (PatchOpKind::Add | PatchOpKind::Replace, None) => Err(PatchError::MissingValue {
                op: self.op,
                path: self.path.to_string(),
            }),
            (PatchOpKind::Remove, Some(_)) => Err(PatchError::UnexpectedValue {
                path: self.path.to_string(),
            }),
            (PatchOpKind::Replace | PatchOpKind::Remove, _) if self.path.ends_with_append() => {
                Err(PatchError::AppendNotAllowed {
                    op: self.op,
                    path: self.path.to_string(),
                })
            },
            _ => Ok(()),
        }
    }
}

/// Ordered patch request; the remote applies ops in sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchSet(Vec<PatchOp>);

impl PatchSet {
    /// Wrap an ordered list of operations.
    #[must_use]
    pub const fn new(ops: Vec<PatchOp>) -> Self {
        Self(ops)
    }

    /// Operations in submission order.
    #[must_use]
    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true when any op deletes a value.
    #[must_use]
    pub fn has_removals(&self) -> bool {
        self.0.iter().any(|op| op.kind() == PatchOpKind::Remove)
    }

    /// Consume into the ordered operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<PatchOp> {
        self.0
    }
}

impl From<Vec<PatchOp>> for PatchSet {
    fn from(ops: Vec<PatchOp>) -> Self {
        Self(ops)
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Nested configuration document mutated through patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Value);

impl Default for ConfigDocument {
    fn default() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

impl From<Value> for ConfigDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl ConfigDocument {
    /// Wrap a JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the underlying JSON.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up the value at `path`.
    #[must_use]
    pub fn get(&self, path: &PatchPath) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(&self.0, |current, segment| child(current, segment))
    }

    /// Returns true when `path` resolves to a value.
    #[must_use]
    pub fn contains(&self, path: &PatchPath) -> bool {
        self.get(path).is_some()
    }

    /// Apply every op in order. On failure the document is left untouched.
    pub fn apply(&mut self, patch: &PatchSet) -> Result<(), PatchError> {
        let mut scratch = self.0.clone();
        for op in patch {
            apply_op(&mut scratch, op)?;
        }
        self.0 = scratch;
        Ok(())
    }

    /// Apply a single op in place. On failure the document is left untouched.
    pub fn apply_op(&mut self, op: &PatchOp) -> Result<(), PatchError> {
        apply_op(&mut self.0, op)
    }
}

fn child<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), segment) => map.get(&segment.as_key()),
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match (value, segment) {
        (Value::Object(map), segment) => map.get_mut(&segment.as_key()),
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

fn apply_op(document: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    op.validate()?;
    let path = op.path();
    let path_text = || path.to_string();

    let Some((parent_path, last)) = path.split_last() else {
        return match (op.kind(), op.value()) {
            (PatchOpKind::Remove, _) => Err(PatchError::RootRemoval),
            (_, Some(value)) => {
                *document = value.clone();
                Ok(())
            },
            (kind, None) => Err(PatchError::MissingValue {
                op: kind,
                path: path_text(),
            }),
        };
    };

    let parent = locate_parent(document, &parent_path, op.kind(), path)?;

    match parent {
        Value::Object(map) => {
            let key = last.as_key();
            match (op.kind(), op.value()) {
                (PatchOpKind::Add, Some(value)) => {
                    map.insert(key, value.clone());
                },
                (PatchOpKind::Replace, Some(value)) => {
                    let Some(slot) = map.get_mut(&key) else {
                        return Err(PatchError::MissingTarget { path: path_text() });
                    };
                    *slot = value.clone();
                },
                (PatchOpKind::Remove, _) => {
                    if map.remove(&key).is_none() {
                        return Err(PatchError::MissingTarget { path: path_text() });
                    }
                },
                (kind, None) => {
                    return Err(PatchError::MissingValue {
                        op: kind,
                        path: path_text(),
                    });
                },
            }
        },
        Value::Array(items) => {
            let len = items.len();
            let index = match last {
                PathSegment::Append => len,
                PathSegment::Index(index) => *index,
                PathSegment::Key(_) => {
                    return Err(PatchError::InvalidArrayIndex { path: path_text() });
                },
            };
            match (op.kind(), op.value()) {
                (PatchOpKind::Add, Some(value)) => {
                    if index > len {
                        return Err(PatchError::IndexOutOfBounds {
                            path: path_text(),
                            index,
                            len,
                        });
                    }
                    items.insert(index, value.clone());
                },
                (PatchOpKind::Replace, Some(value)) => {
                    let Some(slot) = items.get_mut(index) else {
                        return Err(PatchError::IndexOutOfBounds {
                            path: path_text(),
                            index,
                            len,
                        });
                    };
                    *slot = value.clone();
                },
                (PatchOpKind::Remove, _) => {
                    if index >= len {
                        return Err(PatchError::IndexOutOfBounds {
                            path: path_text(),
                            index,
                            len,
                        });
                    }
                    items.remove(index);
                },
                (kind, None) => {
                    return Err(PatchError::MissingValue {
                        op: kind,
                        path: path_text(),
                    });
                },
            }
        },
        _ => {
            return Err(PatchError::NotAContainer {
                path: parent_path.to_string(),
            });
        },
    }

    Ok(())
}

fn locate_parent<'a>(
    document: &'a mut Value,
    parent_path: &PatchPath,
    kind: PatchOpKind,
    target: &PatchPath,
) -> Result<&'a mut Value, PatchError> {
    let mut current = document;
    for (depth, segment) in parent_path.segments().iter().enumerate() {
        if !current.is_object() && !current.is_array() {
            return Err(PatchError::NotAContainer {
                path: parent_path.prefix(depth).to_string(),
            });
        }
        let Some(next) = child_mut(current, segment) else {
            return Err(match kind {
                PatchOpKind::Add => PatchError::MissingParent {
                    path: target.to_string(),
                },
                PatchOpKind::Replace | PatchOpKind::Remove => PatchError::MissingTarget {
                    path: target.to_string(),
                },
            });
        };
        current = next;
    }
    Ok(current)
}
