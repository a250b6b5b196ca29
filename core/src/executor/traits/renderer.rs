/// Sink for run progress events (text, JSONL, ...).
pub trait OutputRendererPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn supports_streaming(&self) -> bool {
        false
    }
    fn render(&self, event: &RenderEvent);
}

/// Progress of one pipeline run, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    RunStart {
        run_id: String,
        subject: String,
        stages: Vec<String>,
    },
    StageStart {
        run_id: String,
        stage: String,
        tasks: Vec<String>,
    },
    TaskComplete {
        run_id: String,
        stage: String,
        task: String,
        source: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    StageEnd {
        run_id: String,
        stage: String,
        succeeded: usize,
        failed: usize,
    },
    RunEnd {
        run_id: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
}

impl RenderEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStart { run_id, .. }
            | Self::StageStart { run_id, .. }
            | Self::TaskComplete { run_id, .. }
            | Self::StageEnd { run_id, .. }
            | Self::RunEnd { run_id, .. } => run_id,
        }
    }

    /// Dotted event name used by structured renderers.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run.start",
            Self::StageStart { .. } => "stage.start",
            Self::TaskComplete { .. } => "task.complete",
            Self::StageEnd { .. } => "stage.end",
            Self::RunEnd { .. } => "run.end",
        }
    }
}
