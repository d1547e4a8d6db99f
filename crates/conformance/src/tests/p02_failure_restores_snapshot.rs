//! P2: After a failed create, every entry the patch touched deep-equals the
//! snapshot taken before it, and unrelated entries are unchanged.

use hearth_mutation::{MutationCallbacks, MutationKind, TransportError};
use serde_json::json;

use crate::fixtures::{self, Rig};
use crate::traits::TestableStore;

pub async fn test_p02_failure_restores_snapshot<T: TestableStore>(
    subject: &T,
) -> Result<(), String> {
    let rig = Rig::new(subject)?;
    let keys = [
        fixtures::list_key(),
        fixtures::detail_key(),
        fixtures::unrelated_key(),
    ];
    let before = keys
        .iter()
        .map(|k| rig.entry(k))
        .collect::<Result<Vec<_>, _>>()?;

    rig.transport.fail(TransportError::Status {
        method: "POST",
        path: "/accommodations".into(),
        status: 503,
    });
    let settlement = rig
        .executor
        .execute(
            &rig.config,
            MutationKind::Create,
            json!({"name": "Cabin A", "capacity": 3}),
            MutationCallbacks::new(),
        )
        .await;
    if settlement.is_success() {
        return Err("P2: create succeeded against a failing server".to_string());
    }

    for (key, captured) in keys.iter().zip(&before) {
        let now = rig.entry(key)?;
        if now.payload != captured.payload {
            return Err(format!(
                "P2: {} differs from its snapshot after rollback:\n  before: {}\n  after:  {}",
                key,
                captured.payload.to_json(),
                now.payload.to_json()
            ));
        }
    }
    Ok(())
}
