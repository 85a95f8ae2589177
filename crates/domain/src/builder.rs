//! Ordered patch construction against a fetched snapshot.
//!
//! The builder owns a working copy of the snapshot and applies every op to it
//! as the op is emitted, so indices computed by later calls already account
//! for earlier inserts and removals. Appends always use the `-` sentinel.

use crate::patch::{ConfigDocument, PatchError, PatchOp, PatchPath, PatchSet, PathSegment};
use serde_json::{Map, Value};

/// Builds a [`PatchSet`] for one logical mutation.
#[derive(Debug, Clone)]
pub struct PatchBuilder {
    working: ConfigDocument,
    ops: Vec<PatchOp>,
}

impl PatchBuilder {
    /// Start from the document fetched immediately before building.
    #[must_use]
    pub fn new(snapshot: &ConfigDocument) -> Self {
        Self {
            working: snapshot.clone(),
            ops: Vec::new(),
        }
    }

    /// Document state after every op emitted so far.
    #[must_use]
    pub const fn working(&self) -> &ConfigDocument {
        &self.working
    }

    /// Ops emitted so far, in order.
    #[must_use]
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Set `path` to `value`.
    ///
    /// Existing values are replaced (unchanged values emit nothing). When the
    /// target or any of its ancestors is absent, a single `add` is emitted at
    /// the highest missing ancestor carrying the synthesized subtree.
    pub fn set(&mut self, path: &PatchPath, value: Value) -> Result<&mut Self, PatchError> {
        if let Some(current) = self.working.get(path) {
            if *current == value {
                return Ok(self);
            }
            return self.emit(PatchOp::replace(path.clone(), value));
        }

        let depth = self.first_missing_depth(path);
        let anchor = path.prefix(depth + 1);
        let remainder = path.segments().get(depth + 1..).unwrap_or_default();
        let subtree = synthesize(remainder, value, path)?;
        self.emit(PatchOp::add(anchor, subtree))
    }

    /// Append `value` to the array at `array_path`, creating the array (and
    /// any missing ancestors) when absent.
    pub fn append(&mut self, array_path: &PatchPath, value: Value) -> Result<&mut Self, PatchError> {
        match self.working.get(array_path) {
            Some(Value::Array(_)) => self.emit(PatchOp::add(array_path.append(), value)),
            Some(_) => Err(PatchError::NotAContainer {
                path: array_path.to_string(),
            }),
            None => self.set(array_path, Value::Array(vec![value])),
        }
    }

    /// Remove the value at `path`; absent values emit nothing.
    pub fn remove(&mut self, path: &PatchPath) -> Result<&mut Self, PatchError> {
        if !self.working.contains(path) {
            return Ok(self);
        }
        self.emit(PatchOp::remove(path.clone()))
    }

    /// Remove every element of the array at `array_path` matching `predicate`.
    ///
    /// Removals are emitted from the highest index down so that each index is
    /// still valid when the remote applies it.
    pub fn remove_where<F>(
        &mut self,
        array_path: &PatchPath,
        mut predicate: F,
    ) -> Result<&mut Self, PatchError>
    where
        F: FnMut(&Value) -> bool,
    {
        let indices: Vec<usize> = match self.working.get(array_path) {
            None => return Ok(self),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter(|(_, item)| predicate(item))
                .map(|(index, _)| index)
                .collect(),
            Some(_) => {
                return Err(PatchError::NotAContainer {
                    path: array_path.to_string(),
                });
            },
        };

        for index in indices.into_iter().rev() {
            self.emit(PatchOp::remove(array_path.index(index)))?;
        }
        Ok(self)
    }

    /// Replace the element whose `key_field` equals the one in `value`, or
    /// append `value` when no element matches.
    pub fn upsert_keyed(
        &mut self,
        array_path: &PatchPath,
        key_field: &str,
        value: Value,
    ) -> Result<&mut Self, PatchError> {
        let key = value.get(key_field).cloned();
        let position = match (self.working.get(array_path), key.as_ref()) {
            (Some(Value::Array(items)), Some(key)) => items
                .iter()
                .position(|item| item.get(key_field) == Some(key)),
            (Some(Value::Array(_)) | None, _) => None,
            (Some(_), _) => {
                return Err(PatchError::NotAContainer {
                    path: array_path.to_string(),
                });
            },
        };

        match position {
            Some(index) => self.set(&array_path.index(index), value),
            None => self.append(array_path, value),
        }
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> PatchSet {
        PatchSet::new(self.ops)
    }

    fn emit(&mut self, op: PatchOp) -> Result<&mut Self, PatchError> {
        self.working.apply_op(&op)?;
        self.ops.push(op);
        Ok(self)
    }

    /// Index of the first segment of `path` whose prefix does not resolve.
    fn first_missing_depth(&self, path: &PatchPath) -> usize {
        (0..path.segments().len())
            .find(|depth| !self.working.contains(&path.prefix(depth + 1)))
            .unwrap_or(0)
    }
}

/// Wrap `leaf` in the containers implied by `segments`.
fn synthesize(segments: &[PathSegment], leaf: Value, path: &PatchPath) -> Result<Value, PatchError> {
    segments.iter().rev().try_fold(leaf, |inner, segment| match segment {
        PathSegment::Key(key) => {
            let mut map = Map::new();
            map.insert(key.clone(), inner);
            Ok(Value::Object(map))
        },
        PathSegment::Index(0) | PathSegment::Append => Ok(Value::Array(vec![inner])),
        PathSegment::Index(index) => Err(PatchError::IndexOutOfBounds {
            path: path.to_string(),
            index: *index,
            len: 0,
        }),
    })
}
