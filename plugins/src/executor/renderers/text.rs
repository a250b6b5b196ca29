use std::sync::Mutex;
use std::time::Duration;

use forge_core::executor::traits::{OutputRendererPlugin, RenderEvent};
use indicatif::{ProgressBar, ProgressStyle};

/// Human-readable progress on stderr, optionally with a per-stage progress bar.
pub struct TextRendererPlugin {
    ascii_only: bool,
    progress: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self {
            ascii_only,
            progress: false,
            bar: Mutex::new(None),
        }
    }

    /// Draws an indicatif bar per stage (for interactive terminals).
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                run_id,
                subject,
                stages,
            } => format!(
                "RUN START {} (subject: {:?}, stages: {})",
                run_id,
                subject,
                stages.join(" -> ")
            ),
            RenderEvent::StageStart {
                run_id,
                stage,
                tasks,
            } => format!(
                "STAGE START {} ({}, tasks: {})",
                run_id,
                stage,
                if tasks.is_empty() {
                    "none".to_string()
                } else {
                    tasks.join(", ")
                }
            ),
            RenderEvent::TaskComplete {
                run_id,
                stage,
                task,
                source,
                success,
                duration_ms,
                error,
            } => {
                let status = match (success, self.ascii_only) {
                    (true, true) => "OK",
                    (true, false) => "✓",
                    (false, true) => "FAIL",
                    (false, false) => "✗",
                };
                let mut line = format!(
                    "TASK END {} ({}/{} via {}, {} {}ms)",
                    run_id, stage, task, source, status, duration_ms
                );
                if let Some(err) = error {
                    line.push_str(&format!(": {}", err));
                }
                line
            }
            RenderEvent::StageEnd {
                run_id,
                stage,
                succeeded,
                failed,
            } => format!(
                "STAGE END {} ({}, succeeded {}, failed {})",
                run_id, stage, succeeded, failed
            ),
            RenderEvent::RunEnd {
                run_id,
                success,
                duration_ms,
                error,
            } => {
                let mut line = format!(
                    "RUN END {} ({}, duration {}ms)",
                    run_id,
                    if *success { "ok" } else { "failed" },
                    duration_ms
                );
                if let Some(err) = error {
                    line.push_str(&format!(": {}", err));
                }
                line
            }
        }
    }

    fn new_bar(&self, stage: &str, len: usize) -> ProgressBar {
        let bar = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("  {spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(if self.ascii_only {
            style.progress_chars("#>-")
        } else {
            style.progress_chars("█▓░")
        });
        bar.set_message(stage.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}

impl OutputRendererPlugin for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        let line = self.format_event(event);
        if !self.progress {
            eprintln!("{}", line);
            return;
        }

        let mut bar = match self.bar.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        match event {
            RenderEvent::StageStart { stage, tasks, .. } => {
                eprintln!("{}", line);
                *bar = Some(self.new_bar(stage, tasks.len()));
            }
            RenderEvent::TaskComplete { .. } => match bar.as_ref() {
                Some(b) => {
                    b.println(line);
                    b.inc(1);
                }
                None => eprintln!("{}", line),
            },
            RenderEvent::StageEnd { .. } => {
                if let Some(b) = bar.take() {
                    b.finish_and_clear();
                }
                eprintln!("{}", line);
            }
            RenderEvent::RunStart { .. } | RenderEvent::RunEnd { .. } => eprintln!("{}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_renderer_task_complete() {
        let renderer = TextRendererPlugin::new(true);
        let event = RenderEvent::TaskComplete {
            run_id: "run".to_string(),
            stage: "enhancement".to_string(),
            task: "seo".to_string(),
            source: "openai".to_string(),
            success: false,
            duration_ms: 5,
            error: Some("task timed out after 5ms".to_string()),
        };

        let line = renderer.format_event(&event);
        assert!(line.contains("TASK END"));
        assert!(line.contains("enhancement/seo via openai"));
        assert!(line.contains("FAIL"));
        assert!(line.ends_with("task timed out after 5ms"));
    }

    #[test]
    fn test_text_renderer_empty_stage() {
        let renderer = TextRendererPlugin::new(false);
        let event = RenderEvent::StageStart {
            run_id: "run".to_string(),
            stage: "enhancement".to_string(),
            tasks: Vec::new(),
        };
        assert!(renderer.format_event(&event).contains("tasks: none"));
    }
}
