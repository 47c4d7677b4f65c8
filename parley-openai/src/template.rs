// ABOUTME: TemplateStage keeps prompt templates in memory and expands parameter messages.
// ABOUTME: Expanded raw requests for a tick go to the RequestStage as one batch.

use crate::endpoint::Endpoint;
use crate::error::PipelineError;
use crate::request::{RequestConfig, RequestStage};
use parley_core::event_log::logger_id;
use parley_core::message::AiReply;
use parley_core::utils::format_template;
use parley_core::{EventLog, Kwargs};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const TYPE_TEMPLATE: &str = "prompt_template";
pub const TYPE_PARAMS: &str = "prompt_params";
pub const TYPE_WORKFLOW: &str = "prompt_workflow";

/// The `type.id` discriminator of an AI request message.
pub fn type_id(msg: &Value) -> Option<&str> {
    msg.get("type")?.get("id")?.as_str()
}

fn object<'a>(msg: &'a Value, key: &str) -> Option<&'a Kwargs> {
    msg.get(key).and_then(Value::as_object)
}

pub struct TemplateStage {
    templates: HashMap<String, Kwargs>,
    log: EventLog,
}

impl TemplateStage {
    pub fn new(config: &RequestConfig) -> Self {
        Self {
            templates: HashMap::new(),
            log: EventLog::new(logger_id(
                config.id_system.as_deref(),
                config.id_node.as_deref(),
                "openai",
                "template",
            )),
        }
    }

    /// Stored templates keyed by `uid_template`.
    pub fn templates(&self) -> &HashMap<String, Kwargs> {
        &self.templates
    }

    /// Apply template updates and expand parameter messages, in batch order.
    ///
    /// Fails on the first malformed message; templates stored before the
    /// failure stay stored.
    pub fn prepare(&mut self, batch: Vec<Value>) -> Result<Vec<Kwargs>, PipelineError> {
        let mut requests = Vec::new();
        for msg in batch {
            let result = self.prepare_one(msg, &mut requests);
            if let Err(err) = result {
                self.log.error(err.to_string());
                return Err(err);
            }
        }
        Ok(requests)
    }

    fn prepare_one(&mut self, msg: Value, requests: &mut Vec<Kwargs>) -> Result<(), PipelineError> {
        let id = type_id(&msg)
            .ok_or(PipelineError::MissingDiscriminator { stage: "template" })?
            .to_string();

        match id.as_str() {
            TYPE_PARAMS => {
                let uid = uid(&msg, "uid_template", "parameter")?;
                let template = self
                    .templates
                    .get(&uid)
                    .ok_or_else(|| PipelineError::UnknownTemplate(uid.clone()))?;
                requests.push(expand(&uid, template, &msg)?);
            }
            TYPE_TEMPLATE => {
                let uid = uid(&msg, "uid_template", "template")?;
                let Value::Object(body) = msg else {
                    return Err(PipelineError::MalformedTemplate {
                        uid,
                        reason: "not an object".to_string(),
                    });
                };
                self.templates.insert(uid, body);
            }
            _ => {
                return Err(PipelineError::UnknownDiscriminator {
                    stage: "template",
                    id,
                })
            }
        }
        Ok(())
    }

    /// One tick: prepare `batch`, then hand the requests to `request`.
    ///
    /// The request stage is stepped even when nothing was prepared so that
    /// results from a delegated worker keep flowing.
    pub async fn step(
        &mut self,
        batch: Vec<Value>,
        now: f64,
        request: &mut RequestStage,
    ) -> Result<Vec<AiReply>, PipelineError> {
        let requests = self.prepare(batch)?;
        let mut out = request.step(requests, now).await?;
        out.extend(self.log.drain().into_iter().map(AiReply::LogEvent));
        Ok(out)
    }
}

fn uid(msg: &Value, field: &'static str, kind: &str) -> Result<String, PipelineError> {
    msg.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::MissingField {
            kind: kind.to_string(),
            field,
        })
}

/// Build the raw request for one parameter message against its template.
fn expand(uid: &str, template: &Kwargs, param: &Value) -> Result<Kwargs, PipelineError> {
    let malformed = |reason: String| PipelineError::MalformedTemplate {
        uid: uid.to_string(),
        reason,
    };

    let id_endpoint = template
        .get("id_endpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing id_endpoint".to_string()))?;
    let endpoint: Endpoint = id_endpoint.parse().map_err(malformed)?;

    let empty = Kwargs::new();
    let args = object(param, "kwargs_tmpl").unwrap_or(&empty);
    let fmt = |text: &str| {
        format_template(text, args).map_err(|source| PipelineError::Format {
            uid: uid.to_string(),
            source,
        })
    };

    let mut request = template
        .get("kwargs_req")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(overrides) = object(param, "kwargs_req") {
        request.extend(overrides.clone());
    }
    request.insert("id_endpoint".to_string(), Value::from(id_endpoint));
    request.insert(
        "state".to_string(),
        param
            .get("state")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
    );

    for &field in endpoint.text_fields() {
        let value = match field {
            "messages" => {
                let items = template
                    .get(field)
                    .and_then(Value::as_array)
                    .ok_or_else(|| malformed("messages must be a list".to_string()))?;
                let mut messages = Vec::with_capacity(items.len());
                for item in items {
                    let role = item.get("role").and_then(Value::as_str);
                    let content = item.get("content").and_then(Value::as_str);
                    let (Some(role), Some(content)) = (role, content) else {
                        return Err(malformed("message needs role and content".to_string()));
                    };
                    let mut msg = Map::new();
                    msg.insert("role".to_string(), Value::from(role));
                    msg.insert("content".to_string(), Value::from(fmt(content)?));
                    if let Some(name) = item.get("name") {
                        msg.insert("name".to_string(), name.clone());
                    }
                    messages.push(Value::Object(msg));
                }
                Value::Array(messages)
            }
            _ => {
                let text = template
                    .get(field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed(format!("missing text field {}", field)))?;
                Value::from(fmt(text)?)
            }
        };
        request.insert(field.to_string(), value);
    }

    Ok(request)
}
