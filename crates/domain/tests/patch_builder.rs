//! Integration coverage for the patch builder and local applier.

use mgmt_client_domain::{
    ConfigDocument, EntryCollection, EntryId, FingerprintEncoding, PatchBuilder, PatchOpKind,
    PatchPath, PatchSet,
};
use mgmt_client_shared::{ErrorCategory, ErrorEnvelope};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::error::Error;

#[derive(Debug, Clone)]
enum Action {
    Append(i64),
    RemoveWhere(i64),
    Upsert(i64, i64),
    SetNested(String, i64),
    RemoveNested(String),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0i64..20).prop_map(Action::Append),
        (2i64..5).prop_map(Action::RemoveWhere),
        (0i64..6, 0i64..100).prop_map(|(key, value)| Action::Upsert(key, value)),
        ("[a-c]{1,2}", 0i64..100).prop_map(|(key, value)| Action::SetNested(key, value)),
        "[a-c]{1,2}".prop_map(Action::RemoveNested),
    ]
}

fn snapshot() -> impl Strategy<Value = ConfigDocument> {
    (
        prop::collection::vec(0i64..20, 0..6),
        prop::bool::ANY,
    )
        .prop_map(|(numbers, with_tree)| {
            let mut root = json!({"numbers": numbers, "keyed": []});
            if with_tree {
                root["tree"] = json!({"a": {"value": 1}});
            }
            ConfigDocument::new(root)
        })
}

fn path(raw: &str) -> PatchPath {
    PatchPath::parse(raw).unwrap_or_default()
}

fn run(builder: &mut PatchBuilder, action: &Action) -> Result<(), Box<dyn Error>> {
    match action {
        Action::Append(value) => {
            builder.append(&path("/numbers"), json!(value))?;
        },
        Action::RemoveWhere(divisor) => {
            builder.remove_where(&path("/numbers"), |item| {
                item.as_i64().is_some_and(|n| n % divisor == 0)
            })?;
        },
        Action::Upsert(key, value) => {
            builder.upsert_keyed(&path("/keyed"), "id", json!({"id": key, "v": value}))?;
        },
        Action::SetNested(key, value) => {
            builder.set(&path("/tree").key(key.as_str()).key("value"), json!(value))?;
        },
        Action::RemoveNested(key) => {
            builder.remove(&path("/tree").key(key.as_str()))?;
        },
    }
    Ok(())
}

proptest! {
    #[test]
    fn replaying_built_ops_reproduces_working_copy(
        base in snapshot(),
        actions in prop::collection::vec(action(), 0..12),
    ) {
        let mut builder = PatchBuilder::new(&base);
        for action in &actions {
            prop_assert!(run(&mut builder, action).is_ok());
        }
        let expected = builder.working().clone();
        let patch = builder.build();

        let mut replay = base;
        prop_assert!(replay.apply(&patch).is_ok());
        prop_assert_eq!(replay, expected);
    }

    #[test]
    fn appends_never_use_computed_indices(
        base in snapshot(),
        values in prop::collection::vec(0i64..20, 1..5),
    ) {
        let mut builder = PatchBuilder::new(&base);
        for value in &values {
            prop_assert!(builder.append(&path("/numbers"), json!(value)).is_ok());
        }
        let patch = builder.build();
        prop_assert!(patch.ops().iter().all(|op| op.path().ends_with_append()));
    }
}

#[test]
fn absent_optional_subtree_is_synthesized_in_one_add() -> Result<(), Box<dyn Error>> {
    let base = ConfigDocument::new(json!({"services": {"identity": {"config": {}}}}));
    let collection = EntryCollection::new(
        path("/services/identity/config/identity/schemas"),
        "id",
        "url",
        FingerprintEncoding::Base64Json,
    );
    let entry = collection.build_entry(&EntryId::parse("customer")?, &json!({"type": "object"}));

    let mut builder = PatchBuilder::new(&base);
    builder.append(collection.path(), entry.clone())?;
    let patch = builder.build();

    let wire = serde_json::to_value(&patch)?;
    assert_eq!(
        wire,
        json!([{
            "op": "add",
            "path": "/services/identity/config/identity",
            "value": {"schemas": [entry]}
        }])
    );
    Ok(())
}

#[test]
fn deep_child_add_without_parent_is_rejected_as_local_validation() -> Result<(), Box<dyn Error>> {
    let patch: PatchSet = serde_json::from_value(json!([
        {"op": "add", "path": "/services/identity/config/courier/smtp", "value": {}}
    ]))?;
    let mut document = ConfigDocument::new(json!({"services": {}}));

    let Err(error) = document.apply(&patch) else {
        return Err("deep add unexpectedly succeeded".into());
    };
    let envelope = ErrorEnvelope::from(error);
    assert_eq!(envelope.category, ErrorCategory::LocalValidation);
    assert_eq!(envelope.code.code(), "missing_parent");
    Ok(())
}

#[test]
fn patch_set_reports_removals() {
    let mut builder = PatchBuilder::new(&ConfigDocument::new(json!({"a": [1, 2]})));
    let emitted = builder.remove(&path("/a/0")).map(|builder| builder.ops().len());
    assert_eq!(emitted.ok(), Some(1));
    let patch = builder.build();
    assert!(patch.has_removals());
    assert_eq!(patch.ops().first().map(|op| op.kind()), Some(PatchOpKind::Remove));
    assert_eq!(
        patch.ops().first().and_then(|op| op.value()),
        None::<&Value>
    );
}
