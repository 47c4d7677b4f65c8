// ABOUTME: WorkflowStage owns primed workflow instances and routes tagged messages to them.
// ABOUTME: Workflows come from a registry of compiled factories or a safe JSON step script.

use crate::error::PipelineError;
use crate::request::{RequestConfig, RequestStage};
use crate::template::{type_id, TemplateStage, TYPE_PARAMS, TYPE_TEMPLATE, TYPE_WORKFLOW};
use anyhow::{anyhow, Result};
use parley_core::event_log::logger_id;
use parley_core::message::AiReply;
use parley_core::EventLog;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// A running workflow: a state machine advanced once per tick with the
/// messages addressed to it. Construction is priming; the first `advance`
/// call already sees real input.
pub trait Workflow: Send {
    fn advance(&mut self, input: Vec<Value>) -> Vec<Value>;
}

/// Creates a workflow from its `prompt_workflow` definition message.
pub type WorkflowFactory = Box<dyn Fn(&Value) -> Result<Box<dyn Workflow>> + Send + Sync>;

pub const FORWARD: &str = "parley.workflows.forward";

/// Compiled workflow implementations, looked up by dotted name.
pub struct WorkflowRegistry {
    factories: HashMap<String, WorkflowFactory>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<Box<dyn Workflow>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str, definition: &Value) -> Result<Box<dyn Workflow>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown workflow: {}", name))?;
        factory(definition)
    }

    pub fn available(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new().register(FORWARD, |_| Ok(Box::new(ForwardWorkflow) as Box<dyn Workflow>))
    }
}

/// Passes template and parameter messages straight through.
pub struct ForwardWorkflow;

impl Workflow for ForwardWorkflow {
    fn advance(&mut self, input: Vec<Value>) -> Vec<Value> {
        input
            .into_iter()
            .filter(|msg| matches!(type_id(msg), Some(TYPE_TEMPLATE) | Some(TYPE_PARAMS)))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Script {
    steps: Vec<Vec<Value>>,
    #[serde(default)]
    repeat: bool,
}

/// Inline workflow that replays a fixed list of message batches, one batch
/// per advance, ignoring its input.
pub struct ScriptedWorkflow {
    script: Script,
    advanced: usize,
}

impl ScriptedWorkflow {
    pub fn parse(source: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            script: serde_json::from_str(source)?,
            advanced: 0,
        })
    }
}

impl Workflow for ScriptedWorkflow {
    fn advance(&mut self, _input: Vec<Value>) -> Vec<Value> {
        let steps = &self.script.steps;
        let idx = self.advanced;
        self.advanced += 1;
        let step = if self.script.repeat && !steps.is_empty() {
            steps.get(idx % steps.len())
        } else {
            steps.get(idx)
        };
        step.cloned().unwrap_or_default()
    }
}

/// Inline scripts contain whitespace or start with `{`; anything else is a
/// registry name.
pub fn is_inline(spec: &str) -> bool {
    spec.starts_with('{') || spec.chars().any(char::is_whitespace)
}

struct Entry {
    uid: String,
    spec: String,
    instance: Box<dyn Workflow>,
}

pub struct WorkflowStage {
    registry: WorkflowRegistry,
    workflows: Vec<Entry>,
    log: EventLog,
}

impl WorkflowStage {
    pub fn new(config: &RequestConfig, registry: WorkflowRegistry) -> Self {
        Self {
            registry,
            workflows: Vec::new(),
            log: EventLog::new(logger_id(
                config.id_system.as_deref(),
                config.id_node.as_deref(),
                "openai",
                "workflow",
            )),
        }
    }

    /// Identifiers of primed workflows, first seen first.
    pub fn workflow_ids(&self) -> Vec<&str> {
        self.workflows.iter().map(|e| e.uid.as_str()).collect()
    }

    fn instantiate(&self, uid: &str, spec: &str, definition: &Value) -> Result<Box<dyn Workflow>, PipelineError> {
        if is_inline(spec) {
            let script = ScriptedWorkflow::parse(spec).map_err(|e| PipelineError::InvalidWorkflow {
                uid: uid.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Box::new(script));
        }
        if !self.registry.contains(spec) {
            return Err(PipelineError::UnknownWorkflow(spec.to_string()));
        }
        self.registry
            .create(spec, definition)
            .map_err(|e| PipelineError::InvalidWorkflow {
                uid: uid.to_string(),
                reason: e.to_string(),
            })
    }

    fn ensure(&mut self, msg: &Value, uid: &str) -> Result<(), PipelineError> {
        let spec = msg.get("spec").and_then(Value::as_str).ok_or_else(|| {
            PipelineError::MissingField {
                kind: TYPE_WORKFLOW.to_string(),
                field: "spec",
            }
        })?;

        if let Some(entry) = self.workflows.iter().find(|e| e.uid == uid) {
            if entry.spec != spec {
                self.log.warning(format!(
                    "Workflow {} is already running; changed spec ignored.",
                    uid
                ));
            }
            return Ok(());
        }

        let instance = self.instantiate(uid, spec, msg)?;
        self.log.info(format!("Workflow {} primed.", uid));
        self.workflows.push(Entry {
            uid: uid.to_string(),
            spec: spec.to_string(),
            instance,
        });
        Ok(())
    }

    /// Register new workflows from `batch`, returning each message's `uid_workflow`.
    fn admit(&mut self, batch: &[Value]) -> Result<Vec<String>, PipelineError> {
        let mut uids = Vec::with_capacity(batch.len());
        for msg in batch {
            let id = type_id(msg).ok_or(PipelineError::MissingDiscriminator { stage: "workflow" })?;
            let uid = msg
                .get("uid_workflow")
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::MissingField {
                    kind: id.to_string(),
                    field: "uid_workflow",
                })?;
            if id == TYPE_WORKFLOW {
                self.ensure(msg, uid)?;
            }
            uids.push(uid.to_string());
        }
        Ok(uids)
    }

    /// One tick: advance every workflow with its share of `batch` and run
    /// what each produces through the template and request stages.
    pub async fn step(
        &mut self,
        batch: Vec<Value>,
        now: f64,
        template: &mut TemplateStage,
        request: &mut RequestStage,
    ) -> Result<Vec<AiReply>, PipelineError> {
        let uids = match self.admit(&batch) {
            Ok(uids) => uids,
            Err(err) => {
                self.log.error(err.to_string());
                return Err(err);
            }
        };

        let mut out = Vec::new();
        for entry in &mut self.workflows {
            let input: Vec<Value> = batch
                .iter()
                .zip(&uids)
                .filter(|(_, uid)| **uid == entry.uid)
                .map(|(msg, _)| msg.clone())
                .collect();
            let produced = entry.instance.advance(input);
            out.extend(template.step(produced, now, request).await?);
        }

        out.extend(self.log.drain().into_iter().map(AiReply::LogEvent));
        Ok(out)
    }
}
