// ABOUTME: RequestStage resolves raw requests and dispatches them to an ApiBackend.
// ABOUTME: Runs colocated in the control loop or delegated to a worker thread behind a relay.

use crate::builder::{build, BuiltRequest};
use crate::error::PipelineError;
use crate::traits::ApiBackend;
use anyhow::{Context, Result};
use parley_core::config::Config;
use parley_core::event_log::logger_id;
use parley_core::message::{AiReply, ApiResult, Kwargs, LogMetric};
use parley_core::relay::{relay, spawn_worker, Relay, WorkerSide};
use parley_core::utils::strip_punctuation;
use parley_core::EventLog;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Settings for a [`RequestStage`].
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub defaults: Kwargs,
    pub is_bit: bool,
    pub is_async: bool,
    pub secs_interval: f64,
    pub queue_capacity: usize,
    pub id_system: Option<String>,
    pub id_node: Option<String>,
}

impl RequestConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            defaults: config.openai.default.clone(),
            is_bit: config.openai.is_bit,
            is_async: config.openai.is_async,
            secs_interval: config.openai.secs_interval,
            queue_capacity: config.openai.queue_capacity,
            id_system: config.system.id_system.clone(),
            id_node: config.system.id_node.clone(),
        }
    }

    fn logger(&self, component: &str) -> String {
        logger_id(
            self.id_system.as_deref(),
            self.id_node.as_deref(),
            "openai",
            component,
        )
    }
}

/// A resolved request plus what the token metric needs from the raw one.
#[derive(Debug, Clone)]
pub struct Job {
    pub built: BuiltRequest,
    /// `model` as given in the raw request, if any.
    pub model: String,
    /// Tick time stamped on the raw request.
    pub created: f64,
}

/// `tokens.total[.{model}][.{id_prompt}][.{id_session}]`
pub fn metric_id(model: &str, state: &Value) -> String {
    let mut id = "tokens.total".to_string();
    let model = strip_punctuation(model);
    let id_prompt = state.get("id_prompt").and_then(Value::as_str).unwrap_or_default();
    let id_session = state.get("id_session").and_then(Value::as_str).unwrap_or_default();
    for segment in [model.as_str(), id_prompt, id_session] {
        if !segment.is_empty() {
            id.push('.');
            id.push_str(segment);
        }
    }
    id
}

/// Perform one call and turn its outcome into reply messages.
///
/// Never fails: API errors are carried in the result's `error` field.
pub async fn process_job(
    job: &Job,
    backend: &dyn ApiBackend,
    is_bit: bool,
    log: &mut EventLog,
) -> Vec<AiReply> {
    let mut result = ApiResult {
        request: job.built.request.clone(),
        response: None,
        error: None,
        state: job.built.state.clone(),
    };

    if is_bit {
        result.response = Some(job.built.simulated.clone());
        return vec![AiReply::OpenaiResult(result)];
    }

    log.info("Make request to OpenAI API.");
    let mut metric = None;
    match backend.call(job.built.endpoint, &job.built.request).await {
        Ok(response) => {
            match response.pointer("/usage/total_tokens").and_then(Value::as_u64) {
                Some(total) => {
                    log.info(format!(
                        "Response received from the OpenAI API. {} tokens used in total.",
                        total
                    ));
                    metrics::counter!("parley_tokens_total").increment(total);
                    metric = Some(LogMetric {
                        created: job.created,
                        id: metric_id(&job.model, &job.built.state),
                        value: total,
                    });
                }
                None => log.info("Response received from the OpenAI API. (No token count)."),
            }
            result.response = Some(response);
        }
        Err(err) => {
            log.error(format!("Error calling OpenAI: {}.", err));
            result.error = Some(err.to_string());
        }
    }

    let mut out = vec![AiReply::OpenaiResult(result)];
    out.extend(metric.map(AiReply::LogMetric));
    out
}

enum Mode {
    Colocated(Arc<dyn ApiBackend>),
    Delegated {
        relay: Relay<Job, AiReply>,
        _worker: std::thread::JoinHandle<()>,
    },
}

pub struct RequestStage {
    defaults: Kwargs,
    is_bit: bool,
    mode: Mode,
    log: EventLog,
}

impl RequestStage {
    /// Build a stage around `backend`, spawning the API worker when delegated.
    pub fn new(config: RequestConfig, backend: Arc<dyn ApiBackend>) -> Result<Self> {
        let log = EventLog::new(config.logger("request"));
        let mode = if config.is_async {
            let (relay, side) = relay::<Job, AiReply>("api", config.queue_capacity);
            let is_bit = config.is_bit;
            let secs_interval = config.secs_interval;
            let logger = config.logger("daemon");
            let worker = spawn_worker("openai-client", move || {
                run_worker(side, backend, is_bit, secs_interval, logger)
            })
            .context("Failed to spawn OpenAI client worker")?;
            Mode::Delegated {
                relay,
                _worker: worker,
            }
        } else {
            Mode::Colocated(backend)
        };

        Ok(Self {
            defaults: config.defaults,
            is_bit: config.is_bit,
            mode,
            log,
        })
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self.mode, Mode::Delegated { .. })
    }

    /// One tick: resolve and dispatch `batch`, return whatever results are ready.
    ///
    /// Colocated calls complete within the tick. Delegated results arrive on
    /// a later tick, so the stage must keep being stepped with empty batches.
    pub async fn step(&mut self, batch: Vec<Kwargs>, now: f64) -> Result<Vec<AiReply>, PipelineError> {
        let mut out = Vec::new();
        let mut jobs = Vec::with_capacity(batch.len());

        for mut raw in batch {
            raw.insert("unix_time".to_string(), Value::from(now));
            let built = match build(&raw, &self.defaults) {
                Ok(built) => built,
                Err(err) => {
                    self.log.error(err.to_string());
                    return Err(err.into());
                }
            };
            let model = raw
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let job = Job {
                built,
                model,
                created: now,
            };

            match &self.mode {
                Mode::Colocated(backend) => {
                    let backend = Arc::clone(backend);
                    out.extend(process_job(&job, backend.as_ref(), self.is_bit, &mut self.log).await);
                }
                Mode::Delegated { .. } => jobs.push(job),
            }
        }

        if let Mode::Delegated { relay, .. } = &mut self.mode {
            out.extend(relay.step(jobs));
        }

        out.extend(self.log.drain().into_iter().map(AiReply::LogEvent));
        Ok(out)
    }
}

/// Body of the delegated API worker thread.
fn run_worker(
    mut side: WorkerSide<Job, AiReply>,
    backend: Arc<dyn ApiBackend>,
    is_bit: bool,
    secs_interval: f64,
    logger: String,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create tokio runtime for OpenAI client worker");
            return;
        }
    };

    rt.block_on(async move {
        let mut log = EventLog::new(logger);
        let idle = Duration::try_from_secs_f64(secs_interval).unwrap_or_default();
        log.info("OpenAI client is ready.");

        loop {
            match side.inbox.try_recv() {
                Ok(job) => {
                    for msg in process_job(&job, backend.as_ref(), is_bit, &mut log).await {
                        match side.outbox.try_send(msg) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                log.error("Result dropped. queue_from_api is full.");
                            }
                            Err(TrySendError::Closed(_)) => return,
                        }
                    }
                }
                Err(TryRecvError::Empty) => tokio::time::sleep(idle).await,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("OpenAI client worker shutting down");
                    return;
                }
            }

            for event in log.drain() {
                match side.outbox.try_send(AiReply::LogEvent(event)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!("log_event dropped. queue_from_api is full.");
                    }
                    Err(TrySendError::Closed(_)) => return,
                }
            }
        }
    });
}
