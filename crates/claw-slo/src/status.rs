//! Status reporting on the source object.

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::error::SloError;
use crate::store::SourceStore;
use crate::types::{CONDITION_TYPE, Condition, ConditionReason, ServiceLevelObjective};

/// Message of a successful pass.
pub const SUCCEEDED_MESSAGE: &str = "Reconciliation succeeded";

/// Builds the condition describing the outcome of a pass.
#[must_use]
pub fn build_condition(
    observed_generation: i64,
    outcome: Option<&SloError>,
    now: DateTime<Utc>,
) -> Condition {
    let (reason, message) = match outcome {
        None => (ConditionReason::Succeeded, SUCCEEDED_MESSAGE.to_string()),
        Some(err) => (
            ConditionReason::Failed,
            format!("Reconciliation failed: {err}"),
        ),
    };

    Condition {
        type_: CONDITION_TYPE.to_string(),
        status: "True".to_string(),
        observed_generation,
        last_transition_time: now,
        reason,
        message,
    }
}

/// Records the outcome of a pass on the source object.
///
/// Replaces the condition list with a single condition and writes the status.
/// On success `source` is updated with the stored object. A failed write is
/// logged and otherwise ignored, so it never blocks later passes.
pub async fn report<S: SourceStore>(
    store: &S,
    source: &mut ServiceLevelObjective,
    outcome: Option<&SloError>,
) {
    let condition = build_condition(source.metadata.generation, outcome, Utc::now());
    if condition.reason == ConditionReason::Failed {
        warn!(
            key = %source.key(),
            message = %condition.message,
            "reconciliation failed"
        );
    }
    source.status.conditions = vec![condition];

    match store.replace_status(source).await {
        Ok(stored) => *source = stored,
        Err(err) => error!(key = %source.key(), error = %err, "failed to update status"),
    }
}
