//! Shared timestamp helpers for run identifiers and event envelopes.

use chrono::Local;
use serde_json::Value as JsonValue;

/// Returns unix-epoch seconds with a `Z` suffix (e.g. `1771220592Z`), used for
/// per-event timestamps in the JSONL logs.
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

/// Returns a calendar-formatted run id, `YYYYMMDD-HHMMSS`, used as the
/// directory name under `.orchestrator/runs/`.
pub fn new_run_id() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Standard JSON envelope shape used for JSONL log lines.
pub fn event_envelope(event: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "ts": now_epoch_z(),
        "event": event,
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_epoch_z_format() {
        let result = now_epoch_z();
        assert!(result.ends_with('Z'));
        let numeric_part = result.trim_end_matches('Z');
        assert!(numeric_part.parse::<u64>().is_ok());
    }

    #[test]
    fn test_new_run_id_shape() {
        let id = new_run_id();
        assert_eq!(id.len(), 15);
        assert_eq!(id.as_bytes()[8], b'-');
    }

    #[test]
    fn test_event_envelope_basic() {
        let envelope = event_envelope("step.attempt", serde_json::json!({"step": "qa"}));
        assert_eq!(envelope["event"], "step.attempt");
        assert_eq!(envelope["step"], "qa");
        assert!(envelope["ts"].is_string());
    }
}
