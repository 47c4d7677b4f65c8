// ABOUTME: Pipeline composes WorkflowStage, TemplateStage and RequestStage into one tick.
// ABOUTME: Direct raw requests skip the workflow and template tiers.

use crate::error::PipelineError;
use crate::request::{RequestConfig, RequestStage};
use crate::template::TemplateStage;
use crate::traits::ApiBackend;
use crate::workflow::{WorkflowRegistry, WorkflowStage};
use anyhow::Result;
use parley_core::config::Config;
use parley_core::message::AiReply;
use parley_core::Kwargs;
use serde_json::Value;
use std::sync::Arc;

pub struct Pipeline {
    workflow: WorkflowStage,
    template: TemplateStage,
    request: RequestStage,
}

impl Pipeline {
    pub fn new(config: RequestConfig, registry: WorkflowRegistry, backend: Arc<dyn ApiBackend>) -> Result<Self> {
        Ok(Self {
            workflow: WorkflowStage::new(&config, registry),
            template: TemplateStage::new(&config),
            request: RequestStage::new(config, backend)?,
        })
    }

    pub fn from_config(config: &Config, registry: WorkflowRegistry, backend: Arc<dyn ApiBackend>) -> Result<Self> {
        Self::new(RequestConfig::from_config(config), registry, backend)
    }

    pub fn template(&self) -> &TemplateStage {
        &self.template
    }

    pub fn workflow(&self) -> &WorkflowStage {
        &self.workflow
    }

    /// One tick. `messages` are workflow-tagged AI request messages;
    /// `requests` are raw requests ready for the request builder.
    pub async fn step(
        &mut self,
        messages: Vec<Value>,
        requests: Vec<Kwargs>,
        now: f64,
    ) -> Result<Vec<AiReply>, PipelineError> {
        let mut out = self
            .workflow
            .step(messages, now, &mut self.template, &mut self.request)
            .await?;
        out.extend(self.request.step(requests, now).await?);
        Ok(out)
    }
}
