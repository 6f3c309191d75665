use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::stage::ui_step_for_stage;
use crate::stream::{StreamEvent, StreamEventKind};

/// Classifies one decoded NDJSON object into a `StreamEvent`.
///
/// Never fails. Missing or mistyped optional fields are left absent; an
/// object without an `event` string is treated as an unknown event with an
/// empty name.
pub fn normalize_event(payload: &Map<String, Value>) -> StreamEvent {
    let name = str_field(payload, "event").unwrap_or_default();
    let nested = payload.get("data").and_then(Value::as_object);
    let data = nested.cloned().unwrap_or_else(|| payload.clone());

    let mut event = StreamEvent::new(name, data);
    event.trace_id = str_field(payload, "trace_id");
    event.server_ts = str_field(payload, "ts").and_then(|ts| parse_timestamp(&ts));

    match event.kind {
        StreamEventKind::StreamOpen | StreamEventKind::Complete | StreamEventKind::Unknown => {}
        StreamEventKind::Heartbeat => {
            event.stage = str_field(payload, "current_stage");
            event.idle_ms = payload.get("idle_ms").and_then(as_millis);
            apply_stage_step(&mut event);
        }
        StreamEventKind::StageComplete => {
            event.stage = str_field(payload, "stage").or_else(|| nested_str(nested, "stage"));
            event.ui_step = payload
                .get("ui_step")
                .or_else(|| nested.and_then(|d| d.get("ui_step")))
                .and_then(Value::as_u64)
                .and_then(|v| u8::try_from(v).ok());
            event.ui_step_title =
                str_field(payload, "ui_step_title").or_else(|| nested_str(nested, "ui_step_title"));
            apply_stage_step(&mut event);
        }
        StreamEventKind::Error => {
            event.stage = str_field(payload, "stage").or_else(|| nested_str(nested, "stage"));
            let message =
                str_field(payload, "message").or_else(|| nested_str(nested, "message"));
            if let Some(stage) = &event.stage {
                event
                    .data
                    .entry("stage")
                    .or_insert_with(|| Value::String(stage.clone()));
            }
            if let Some(message) = message {
                event
                    .data
                    .entry("message")
                    .or_insert(Value::String(message));
            }
            apply_stage_step(&mut event);
        }
    }
    event
}

/// Fills whichever of step and title is still missing from the stage table.
fn apply_stage_step(event: &mut StreamEvent) {
    let Some(step) = event.stage.as_deref().and_then(ui_step_for_stage) else {
        return;
    };
    event.ui_step.get_or_insert(step.index);
    event
        .ui_step_title
        .get_or_insert_with(|| step.title.to_string());
}

fn str_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

fn nested_str(nested: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    nested.and_then(|data| str_field(data, key))
}

fn as_millis(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64)
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
