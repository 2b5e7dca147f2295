use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

/// Status fields that change on every successful pass without meaning.
const VOLATILE_FIELDS: &[&str] = &["lastReconcileTime", "lastQueryTime"];

/// Whether `desired` differs materially from the last published status.
pub fn should_publish<S: Serialize>(current: Option<&S>, desired: &S) -> bool {
    match current {
        None => {
            debug!("should_publish: no current status, publishing");
            true
        }
        Some(cur) => {
            let cur_norm = normalize_status(cur);
            let des_norm = normalize_status(desired);
            let differs = cur_norm != des_norm;
            if differs {
                debug!(
                    current = %cur_norm,
                    desired = %des_norm,
                    "should_publish: status differs"
                );
            } else {
                trace!("should_publish: status identical, skipping write");
            }
            differs
        }
    }
}

fn normalize_status<S: Serialize>(s: &S) -> Value {
    let mut v = serde_json::to_value(s).unwrap_or_else(|_| json!({}));
    if let Value::Object(ref mut map) = v {
        for field in VOLATILE_FIELDS {
            map.remove(*field);
        }
        if let Some(Value::Array(conds)) = map.get_mut("conditions") {
            for c in conds.iter_mut() {
                if let Some(obj) = c.as_object_mut() {
                    obj.remove("lastTransitionTime");
                }
            }
        }
    }
    v
}
