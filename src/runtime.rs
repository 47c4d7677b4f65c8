// ABOUTME: Control loop that advances the bot relay, the session reducer and the AI pipeline in lock-step.
// ABOUTME: One tick moves every lane by one step; results feed back on the same or next tick.

use crate::gateway::worker::BotRelay;
use anyhow::{Context, Result};
use parley_core::config::{Config, WorkflowDef};
use parley_core::message::{now_secs, AiReply, LogEvent, LogMetric, PlatformCommand, PlatformEvent};
use parley_core::{Inbound, Kwargs, SessionOrchestrator};
use parley_openai::Pipeline;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Counts of what one tick moved, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub platform_in: usize,
    pub platform_out: usize,
    pub ai_results: usize,
}

pub struct Runtime {
    bot: BotRelay,
    orchestrator: SessionOrchestrator,
    pipeline: Pipeline,
    to_platform: Vec<PlatformCommand>,
    to_workflows: Vec<Value>,
    to_requests: Vec<Kwargs>,
    seen_ready: bool,
    tick_period: Duration,
}

/// Shortest period the control loop ticks at.
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// `secs_tick` as a tick period. Never zero; out-of-range values fall back
/// to the default tick.
pub fn tick_period(secs_tick: f64) -> Duration {
    Duration::try_from_secs_f64(secs_tick)
        .unwrap_or(Duration::from_millis(100))
        .max(MIN_TICK_PERIOD)
}

/// `prompt_workflow` message for a configured workflow.
pub fn workflow_message(def: &WorkflowDef) -> Value {
    json!({
        "type": {"id": "prompt_workflow", "ver": "1.0"},
        "uid_workflow": def.uid_workflow,
        "spec": def.spec,
    })
}

impl Runtime {
    /// Queue command registrations and start-up workflows for the first tick.
    pub fn new(config: &Config, bot: BotRelay, pipeline: Pipeline, orchestrator: SessionOrchestrator) -> Self {
        Self {
            bot,
            orchestrator,
            pipeline,
            to_platform: SessionOrchestrator::command_registrations(),
            to_workflows: config.workflows.iter().map(workflow_message).collect(),
            to_requests: Vec::new(),
            seen_ready: false,
            tick_period: tick_period(config.runtime.secs_tick),
        }
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Queue an AI request message (`prompt_workflow`, `prompt_template`,
    /// `prompt_params`) for the next tick.
    pub fn submit(&mut self, message: Value) {
        self.to_workflows.push(message);
    }

    /// Queue a raw request for the request stage.
    pub fn submit_request(&mut self, request: Kwargs) {
        self.to_requests.push(request);
    }

    pub fn is_gateway_stopped(&self) -> bool {
        self.bot.is_worker_stopped()
    }

    /// Advance every lane by one step. Pipeline errors are configuration
    /// defects and abort the tick.
    pub async fn tick(&mut self, now: f64) -> Result<TickReport> {
        let mut report = TickReport {
            platform_out: self.to_platform.len(),
            ..TickReport::default()
        };

        let events = self.bot.step(std::mem::take(&mut self.to_platform));
        report.platform_in = events.len();
        for event in &events {
            self.on_platform_event(event);
        }

        let replies = self
            .pipeline
            .step(
                std::mem::take(&mut self.to_workflows),
                std::mem::take(&mut self.to_requests),
                now,
            )
            .await
            .context("AI pipeline tick failed")?;

        for reply in replies {
            match reply {
                AiReply::OpenaiResult(result) => {
                    report.ai_results += 1;
                    let update = self.orchestrator.update(Inbound::Result(&result));
                    self.to_platform.extend(update.platform);
                    self.to_requests.extend(update.ai);
                }
                AiReply::LogMetric(metric) => record_metric(&metric),
                AiReply::LogEvent(event) => record_event(&event),
            }
        }

        Ok(report)
    }

    fn on_platform_event(&mut self, event: &PlatformEvent) {
        match event {
            PlatformEvent::Ready { attempt } => {
                tracing::info!(attempt, "Gateway ready");
                if self.seen_ready {
                    self.to_platform.extend(SessionOrchestrator::command_registrations());
                }
                self.seen_ready = true;
            }
            PlatformEvent::LogEvent(log_event) => record_event(log_event),
            PlatformEvent::LogMetric(metric) => record_metric(metric),
            _ => {
                let update = self.orchestrator.update(Inbound::Platform(event));
                self.to_platform.extend(update.platform);
                self.to_requests.extend(update.ai);
            }
        }
    }

    /// Tick every `secs_tick` until `shutdown` resolves or the gateway
    /// worker stops.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(secs_tick = self.tick_period.as_secs_f64(), "Control loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping control loop");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let report = self.tick(now_secs()).await?;
                    if report != TickReport::default() {
                        tracing::debug!(?report, "Tick");
                    }
                    if self.is_gateway_stopped() {
                        anyhow::bail!("Gateway worker stopped");
                    }
                }
            }
        }
    }
}

/// Log events were written to tracing where they were created; here they
/// are only counted.
fn record_event(event: &LogEvent) {
    metrics::counter!("parley_log_events_total", "level" => event.level.as_str()).increment(1);
}

fn record_metric(metric: &LogMetric) {
    tracing::info!(
        metric = %metric.id,
        value = metric.value,
        created = metric.created,
        "log_metric"
    );
}
