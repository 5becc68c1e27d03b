//! Event sinks and the canonical event schema.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::warn;

use crate::core::events::LifecycleEvent;

const LIFECYCLE_EVENT_SCHEMA: &str = include_str!("../../schemas/lifecycle_event.schema.json");

/// Destination for lifecycle events.
///
/// Publishing is fire-and-forget: sinks handle their own failures and the
/// engine never waits on an acknowledgement.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &LifecycleEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: &LifecycleEvent) {}
}

/// Keeps every event in memory, in publish order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.lock().clone()
    }

    pub fn events_for_run(&self, run_id: &str) -> Vec<LifecycleEvent> {
        self.lock()
            .iter()
            .filter(|event| event.run_id == run_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LifecycleEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for MemoryEventSink {
    fn publish(&self, event: &LifecycleEvent) {
        self.lock().push(event.clone());
    }
}

/// Writes one canonical JSON object per line.
#[derive(Debug)]
pub struct JsonlEventSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlEventSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, event: &LifecycleEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serialize event")?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}").context("write event line")?;
        writer.flush().context("flush event line")
    }
}

impl<W: Write + Send> EventSink for JsonlEventSink<W> {
    fn publish(&self, event: &LifecycleEvent) {
        if let Err(err) = self.write_line(event) {
            warn!(run_id = %event.run_id, error = %err, "dropping lifecycle event");
        }
    }
}

/// Compiled JSON Schema for the canonical event payload.
pub struct EventSchema {
    validator: Validator,
}

impl EventSchema {
    pub fn new() -> Result<Self> {
        let schema: Value =
            serde_json::from_str(LIFECYCLE_EVENT_SCHEMA).context("parse lifecycle event schema")?;
        let validator =
            validator_for(&schema).map_err(|err| anyhow!("invalid event schema: {}", err))?;
        Ok(Self { validator })
    }

    /// Validate a serialized event payload.
    pub fn validate(&self, payload: &Value) -> Result<()> {
        if self.validator.is_valid(payload) {
            return Ok(());
        }
        let messages = self
            .validator
            .iter_errors(payload)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        Err(anyhow!(
            "event schema validation failed: {}",
            messages.join("; ")
        ))
    }

    pub fn validate_event(&self, event: &LifecycleEvent) -> Result<()> {
        let payload = serde_json::to_value(event).context("serialize event")?;
        self.validate(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::RunState;
    use serde_json::json;

    #[test]
    fn memory_sink_filters_by_run() {
        let sink = MemoryEventSink::new();
        sink.publish(&LifecycleEvent::run_status("run-1", RunState::Running, None));
        sink.publish(&LifecycleEvent::run_status("run-2", RunState::Running, None));
        sink.publish(&LifecycleEvent::run_status("run-1", RunState::Completed, None));
        assert_eq!(sink.events().len(), 3);
        let states: Vec<_> = sink
            .events_for_run("run-1")
            .into_iter()
            .map(|event| event.state)
            .collect();
        assert_eq!(states, ["running", "completed"]);
    }

    #[test]
    fn jsonl_sink_writes_one_object_per_line() {
        let sink = JsonlEventSink::new(Vec::new());
        sink.publish(&LifecycleEvent::run_status("run-1", RunState::Running, None));
        sink.publish(&LifecycleEvent::run_status("run-1", RunState::Paused, None));
        let text = String::from_utf8(sink.into_inner()).expect("utf8");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["state"], json!("paused"));
    }

    #[test]
    fn schema_accepts_canonical_events() {
        let schema = EventSchema::new().expect("schema");
        schema
            .validate_event(&LifecycleEvent::run_status("run-1", RunState::Running, None))
            .expect("valid");
    }

    #[test]
    fn schema_rejects_malformed_payloads() {
        let schema = EventSchema::new().expect("schema");
        let missing_type = json!({
            "run_id": "run-1",
            "step_id": null,
            "state": "running",
            "timestamp": "2024-05-01T12:00:00.000Z",
        });
        assert!(schema.validate(&missing_type).is_err());

        let step_event_without_step = json!({
            "run_id": "run-1",
            "step_id": null,
            "state": "planned",
            "timestamp": "2024-05-01T12:00:00.000Z",
            "event_type": "step.planned",
            "duration_ms": 3,
        });
        let err = schema
            .validate(&step_event_without_step)
            .expect_err("step id required");
        assert!(err.to_string().contains("schema validation failed"));
    }
}
