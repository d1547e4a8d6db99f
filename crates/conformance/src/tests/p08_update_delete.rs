//! P8: Update and delete follow the same lifecycle as create: the patch is
//! visible while pending, reconciled on success and rolled back on failure.

use hearth_core::EntityId;
use hearth_mutation::{MutationCallbacks, MutationKind, TransportError};
use serde_json::{json, Value};

use crate::fixtures::{self, Rig};
use crate::traits::TestableStore;

pub async fn test_p08_update_delete<T: TestableStore>(subject: &T) -> Result<(), String> {
    let rig = Rig::new(subject)?;
    let a2 = EntityId::Confirmed("a2".into());
    let list_before = rig.entry(&fixtures::list_key())?;
    let detail_before = rig.entry(&fixtures::detail_key())?;

    // Update, failing: list and detail revert.
    let responder = rig.transport.defer();
    let prepared = rig
        .executor
        .prepare(
            &rig.config,
            MutationKind::Update { id: "a2".into() },
            json!({"capacity": 5}),
        )
        .map_err(|e| format!("P8: prepare update failed: {}", e))?;
    let flight = rig.executor.begin(prepared, MutationCallbacks::new());
    let capacity = rig.page()?.find(&a2).and_then(|e| e.get("capacity").cloned());
    if capacity != Some(json!(5)) {
        return Err(format!("P8: pending update not visible: {:?}", capacity));
    }
    responder.reject(TransportError::Network {
        message: "timeout".into(),
    });
    rig.executor.finish(flight).await;
    if rig.entry(&fixtures::list_key())?.payload != list_before.payload
        || rig.entry(&fixtures::detail_key())?.payload != detail_before.payload
    {
        return Err("P8: failed update not rolled back".to_string());
    }

    // Update, succeeding: the server's version lands in both entries.
    rig.transport
        .respond(json!({"id": "a2", "name": "Cabin Y", "capacity": 5, "rev": 2}));
    let settlement = rig
        .executor
        .execute(
            &rig.config,
            MutationKind::Update { id: "a2".into() },
            json!({"capacity": 5}),
            MutationCallbacks::new(),
        )
        .await;
    if !settlement.is_success() {
        return Err(format!("P8: update failed: {:?}", settlement.outcome));
    }
    let detail = rig
        .entry(&fixtures::detail_key())?
        .payload
        .as_detail()
        .cloned()
        .ok_or_else(|| "P8: detail entry lost".to_string())?;
    if detail.get("rev") != Some(&json!(2)) {
        return Err(format!("P8: detail not reconciled: {}", detail.to_json()));
    }

    // Delete, failing: the item returns to its position.
    let before_delete = rig.page()?;
    rig.transport.fail(TransportError::Status {
        method: "DELETE",
        path: "/accommodations/a2".into(),
        status: 403,
    });
    rig.executor
        .execute(
            &rig.config,
            MutationKind::Delete { id: "a2".into() },
            Value::Null,
            MutationCallbacks::new(),
        )
        .await;
    if rig.page()? != before_delete {
        return Err("P8: failed delete not rolled back".to_string());
    }

    // Delete, succeeding: the item stays gone.
    rig.transport.respond(Value::Null);
    let deleted = rig
        .executor
        .execute(
            &rig.config,
            MutationKind::Delete { id: "a2".into() },
            Value::Null,
            MutationCallbacks::new(),
        )
        .await;
    let page = rig.page()?;
    if !deleted.is_success() || page.find(&a2).is_some() || page.total != 2 {
        return Err(format!("P8: delete not applied: {}", page.to_json()));
    }
    Ok(())
}
