// ABOUTME: Integration tests for RequestStage in colocated and delegated modes.
// ABOUTME: Uses built-in-test mode and MockBackend; no network traffic.

use parley_core::message::{AiReply, ApiResult, LogMetric};
use parley_core::Kwargs;
use parley_openai::backends::mock::MockBackend;
use parley_openai::{Endpoint, PipelineError, RequestConfig, RequestStage};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn config(is_bit: bool, is_async: bool) -> RequestConfig {
    RequestConfig {
        defaults: Kwargs::new(),
        is_bit,
        is_async,
        secs_interval: 0.01,
        queue_capacity: 16,
        id_system: Some("test".to_string()),
        id_node: Some("openai-client".to_string()),
    }
}

fn raw(value: Value) -> Kwargs {
    match value {
        Value::Object(map) => map,
        _ => panic!("raw request must be an object"),
    }
}

fn results(out: &[AiReply]) -> Vec<&ApiResult> {
    out.iter()
        .filter_map(|r| match r {
            AiReply::OpenaiResult(res) => Some(res),
            _ => None,
        })
        .collect()
}

fn metrics(out: &[AiReply]) -> Vec<&LogMetric> {
    out.iter()
        .filter_map(|r| match r {
            AiReply::LogMetric(m) => Some(m),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_bit_completions_returns_canned_payload() {
    let mock = MockBackend::new();
    let mut stage = RequestStage::new(config(true, false), Arc::new(mock.clone())).unwrap();

    let out = stage
        .step(
            vec![raw(json!({
                "id_endpoint": "completions",
                "model": "text-davinci-003",
                "prompt": "completions_test_prompt_text"
            }))],
            1_700_000_000.0,
        )
        .await
        .unwrap();

    let res = results(&out);
    assert_eq!(res.len(), 1);
    assert_eq!(
        Value::Object(res[0].request.clone()),
        json!({"model": "text-davinci-003", "prompt": "completions_test_prompt_text"})
    );
    assert_eq!(res[0].response, Some(Endpoint::Completions.simulated_response()));
    assert_eq!(res[0].error, None);
    assert_eq!(res[0].state, json!({}));
    assert!(metrics(&out).is_empty());
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_defaults_supply_endpoint_and_model() {
    let mut cfg = config(true, false);
    cfg.defaults = raw(json!({"id_endpoint": "completions", "model": "text-davinci-003"}));
    let mut stage = RequestStage::new(cfg, Arc::new(MockBackend::new())).unwrap();

    let out = stage.step(vec![raw(json!({"prompt": "P"}))], 0.0).await.unwrap();
    let res = results(&out);
    assert_eq!(
        Value::Object(res[0].request.clone()),
        json!({"model": "text-davinci-003", "prompt": "P"})
    );
}

#[tokio::test]
async fn test_successful_call_emits_token_metric() {
    let mock = MockBackend::new()
        .on_endpoint(Endpoint::ChatCompletions)
        .respond(json!({
            "choices": [{"message": {"role": "assistant", "content": "Summary."}}],
            "usage": {"total_tokens": 42}
        }));
    let mut stage = RequestStage::new(config(false, false), Arc::new(mock.clone())).unwrap();

    let out = stage
        .step(
            vec![raw(json!({
                "id_endpoint": "chat_completions",
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "system", "content": "hi"}],
                "state": {"id_prompt": "summary", "id_session": "a1b2c3"}
            }))],
            123.5,
        )
        .await
        .unwrap();

    let res = results(&out);
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].state, json!({"id_prompt": "summary", "id_session": "a1b2c3"}));

    let metric = metrics(&out);
    assert_eq!(metric.len(), 1);
    assert_eq!(metric[0].id, "tokens.total.gpt35turbo.summary.a1b2c3");
    assert_eq!(metric[0].value, 42);
    assert_eq!(metric[0].created, 123.5);

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, Endpoint::ChatCompletions);
    assert!(!calls[0].1.contains_key("state"));
}

#[tokio::test]
async fn test_api_failure_is_carried_as_data() {
    let mock = MockBackend::new()
        .on_endpoint(Endpoint::Completions)
        .respond_error("rate limited");
    let mut stage = RequestStage::new(config(false, false), Arc::new(mock)).unwrap();

    let out = stage
        .step(
            vec![raw(json!({"id_endpoint": "completions", "model": "m", "prompt": "P"}))],
            0.0,
        )
        .await
        .unwrap();

    let res = results(&out);
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].response, None);
    assert!(res[0].error.as_deref().unwrap_or_default().contains("rate limited"));
    assert!(metrics(&out).is_empty());
    assert!(out.iter().any(|r| matches!(r, AiReply::LogEvent(e) if e.logger == "test.openai-client.request")));
}

#[tokio::test]
async fn test_build_error_fails_the_tick() {
    let mock = MockBackend::new();
    let mut stage = RequestStage::new(config(false, false), Arc::new(mock.clone())).unwrap();

    let err = stage
        .step(vec![raw(json!({"id_endpoint": "completions", "prompt": "P"}))], 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Build(_)));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_delegated_results_arrive_on_later_ticks() {
    let mock = MockBackend::new()
        .on_endpoint(Endpoint::Embeddings)
        .respond(json!({"data": [], "usage": {"total_tokens": 7}}));
    let mut stage = RequestStage::new(config(false, true), Arc::new(mock)).unwrap();
    assert!(stage.is_delegated());

    let mut out = stage
        .step(
            vec![raw(json!({
                "id_endpoint": "embeddings",
                "model": "text-embedding-ada-002",
                "input": "hello"
            }))],
            10.0,
        )
        .await
        .unwrap();

    for _ in 0..200 {
        if !results(&out).is_empty() && !metrics(&out).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        out.extend(stage.step(vec![], 11.0).await.unwrap());
    }

    let res = results(&out);
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].response, Some(json!({"data": [], "usage": {"total_tokens": 7}})));
    let metric = metrics(&out);
    assert_eq!(metric[0].id, "tokens.total.textembeddingada002");
    assert_eq!(metric[0].created, 10.0);
}
