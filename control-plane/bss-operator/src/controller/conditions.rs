use chrono::{DateTime, SecondsFormat, Utc};

use crate::crd::{Condition, ConditionStatus, ConditionType};

/// Upsert the condition of type `type_`.
///
/// `lastTransitionTime` moves only when the status flips; a reason or
/// message change at constant status keeps the earlier timestamp.
/// Returns whether anything changed.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    now: &DateTime<Utc>,
) -> bool {
    let message = message.into();
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        let mut changed = false;
        if existing.status != status {
            existing.status = status;
            existing.last_transition_time = Some(timestamp(now));
            changed = true;
        }
        if existing.reason.as_deref() != Some(reason) {
            existing.reason = Some(reason.to_string());
            changed = true;
        }
        if existing.message.as_deref() != Some(message.as_str()) {
            existing.message = Some(message);
            changed = true;
        }
        if existing.last_transition_time.is_none() {
            existing.last_transition_time = Some(timestamp(now));
            changed = true;
        }
        return changed;
    }

    conditions.push(Condition {
        type_,
        status,
        reason: Some(reason.to_string()),
        message: Some(message),
        last_transition_time: Some(timestamp(now)),
    });
    // keep a stable order to reduce churn
    conditions.sort_by_key(|c| cond_rank(&c.type_));
    true
}

/// True once at least one condition has been recorded.
pub fn has_any(conditions: &[Condition]) -> bool {
    !conditions.is_empty()
}

pub fn find_condition(
    conditions: &[Condition],
    type_: ConditionType,
) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_status(
    conditions: &[Condition],
    type_: ConditionType,
    status: ConditionStatus,
) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == status)
}

pub fn timestamp(now: &DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn cond_rank(t: &ConditionType) -> u8 {
    match t {
        ConditionType::Available => 0,
        ConditionType::Degraded => 1,
        ConditionType::Unknown => 250,
    }
}
