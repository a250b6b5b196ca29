use chrono::Local;
use forge_core::executor::traits::{OutputRendererPlugin, RenderEvent};
use serde_json::{json, Value};

/// One JSON object per event on stdout.
pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        let ts = Local::now().to_rfc3339();
        let mut value = json!({
            "v": 1,
            "event_type": event.event_type(),
            "ts": ts,
            "run_id": event.run_id(),
        });
        let (task_id, metadata) = match event {
            RenderEvent::RunStart {
                subject, stages, ..
            } => (
                None,
                json!({
                    "subject": subject,
                    "stages": stages,
                }),
            ),
            RenderEvent::StageStart { stage, tasks, .. } => (
                None,
                json!({
                    "stage": stage,
                    "tasks": tasks,
                }),
            ),
            RenderEvent::TaskComplete {
                stage,
                task,
                source,
                success,
                duration_ms,
                error,
                ..
            } => (
                Some(task.clone()),
                json!({
                    "stage": stage,
                    "source": source,
                    "success": success,
                    "duration_ms": duration_ms,
                    "error": error,
                }),
            ),
            RenderEvent::StageEnd {
                stage,
                succeeded,
                failed,
                ..
            } => (
                None,
                json!({
                    "stage": stage,
                    "succeeded": succeeded,
                    "failed": failed,
                }),
            ),
            RenderEvent::RunEnd {
                success,
                duration_ms,
                error,
                ..
            } => (
                None,
                json!({
                    "success": success,
                    "duration_ms": duration_ms,
                    "error": error,
                }),
            ),
        };
        if let Some(obj) = value.as_object_mut() {
            if let Some(task_id) = task_id {
                obj.insert("task_id".into(), Value::String(task_id));
            }
            obj.insert("metadata".into(), metadata);
        }
        value
    }
}

impl OutputRendererPlugin for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn render(&self, event: &RenderEvent) {
        let value = self.event_to_json(event);
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()));
        } else {
            println!("{}", serde_json::to_string(&value).unwrap_or_else(|_| "{}".into()));
        }
    }
}
