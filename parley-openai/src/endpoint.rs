// ABOUTME: Fixed field schema, HTTP route and canned test payload for each supported endpoint.
// ABOUTME: The schema table drives request resolution; nothing here performs I/O.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Supported generative-AI API endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Completions,
    ChatCompletions,
    Edits,
    ImagesGenerations,
    ImagesEdits,
    ImagesVariations,
    Embeddings,
    AudioTranscriptions,
    AudioTranslations,
}

/// JSON shape a request field may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    List,
    /// Integral numbers only.
    Int,
    /// Non-integral numbers only, e.g. `0.5` or `1.0`.
    Float,
    Bool,
    Dict,
}

impl FieldType {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Str => value.is_string(),
            FieldType::List => value.is_array(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_f64(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Dict => value.is_object(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::Str => "str",
            FieldType::List => "list",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Dict => "dict",
        }
    }
}

/// One row of an endpoint's field schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Must be resolvable for the request to be built at all.
    pub internal: bool,
    /// Must be present for the remote API to accept the request.
    pub external: bool,
    pub name: &'static str,
    pub types: &'static [FieldType],
}

use FieldType::{Bool, Dict, Float, Int, List, Str};

const fn field(
    internal: bool,
    external: bool,
    name: &'static str,
    types: &'static [FieldType],
) -> FieldSpec {
    FieldSpec {
        internal,
        external,
        name,
        types,
    }
}

const Y: bool = true;
const N: bool = false;

const COMPLETIONS: &[FieldSpec] = &[
    field(N, Y, "model", &[Str]),
    field(Y, N, "prompt", &[Str, List]),
    field(N, N, "suffix", &[Str]),
    field(N, N, "max_tokens", &[Int]),
    field(N, N, "temperature", &[Float]),
    field(N, N, "top_p", &[Float]),
    field(N, N, "n", &[Int]),
    field(N, N, "stream", &[Bool]),
    field(N, N, "logprobs", &[Int]),
    field(N, N, "echo", &[Bool]),
    field(N, N, "stop", &[Str, List]),
    field(N, N, "presence_penalty", &[Float]),
    field(N, N, "frequency_penalty", &[Float]),
    field(N, N, "best_of", &[Int]),
    field(N, N, "logit_bias", &[Dict]),
    field(N, N, "user", &[Str]),
];

const CHAT_COMPLETIONS: &[FieldSpec] = &[
    field(N, Y, "model", &[Str]),
    field(Y, Y, "messages", &[List]),
    field(N, N, "temperature", &[Float]),
    field(N, N, "top_p", &[Float]),
    field(N, N, "n", &[Int]),
    field(N, N, "stream", &[Bool]),
    field(N, N, "stop", &[Str, List]),
    field(N, N, "max_tokens", &[Int]),
    field(N, N, "presence_penalty", &[Float]),
    field(N, N, "frequency_penalty", &[Float]),
    field(N, N, "logit_bias", &[Dict]),
    field(N, N, "user", &[Str]),
];

const EDITS: &[FieldSpec] = &[
    field(N, Y, "model", &[Str]),
    field(Y, N, "input", &[Str]),
    field(Y, Y, "instruction", &[Str]),
    field(N, N, "n", &[Int]),
    field(N, N, "temperature", &[Float]),
    field(N, N, "top_p", &[Float]),
];

const IMAGES_GENERATIONS: &[FieldSpec] = &[
    field(Y, Y, "prompt", &[Str]),
    field(N, N, "n", &[Int]),
    field(N, N, "size", &[Str]),
    field(N, N, "response_format", &[Str]),
    field(N, N, "user", &[Str]),
];

const IMAGES_EDITS: &[FieldSpec] = &[
    field(Y, Y, "image", &[Str]),
    field(N, N, "mask", &[Str]),
    field(Y, Y, "prompt", &[Str]),
    field(N, N, "n", &[Int]),
    field(N, N, "size", &[Str]),
    field(N, N, "response_format", &[Str]),
    field(N, N, "user", &[Str]),
];

const IMAGES_VARIATIONS: &[FieldSpec] = &[
    field(Y, Y, "image", &[Str]),
    field(N, N, "n", &[Int]),
    field(N, N, "size", &[Str]),
    field(N, N, "response_format", &[Str]),
    field(N, N, "user", &[Str]),
];

const EMBEDDINGS: &[FieldSpec] = &[
    field(N, Y, "model", &[Str]),
    field(Y, Y, "input", &[Str, List]),
    field(N, N, "user", &[Str]),
];

const AUDIO_TRANSCRIPTIONS: &[FieldSpec] = &[
    field(Y, Y, "file", &[Str]),
    field(N, Y, "model", &[Str]),
    field(N, N, "prompt", &[Str]),
    field(N, N, "response_format", &[Str]),
    field(N, N, "temperature", &[Float]),
    field(N, N, "language", &[Str]),
];

const AUDIO_TRANSLATIONS: &[FieldSpec] = &[
    field(Y, Y, "file", &[Str]),
    field(N, Y, "model", &[Str]),
    field(N, N, "prompt", &[Str]),
    field(N, N, "response_format", &[Str]),
    field(N, N, "temperature", &[Float]),
];

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::Completions,
        Endpoint::ChatCompletions,
        Endpoint::Edits,
        Endpoint::ImagesGenerations,
        Endpoint::ImagesEdits,
        Endpoint::ImagesVariations,
        Endpoint::Embeddings,
        Endpoint::AudioTranscriptions,
        Endpoint::AudioTranslations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Completions => "completions",
            Endpoint::ChatCompletions => "chat_completions",
            Endpoint::Edits => "edits",
            Endpoint::ImagesGenerations => "images_generations",
            Endpoint::ImagesEdits => "images_edits",
            Endpoint::ImagesVariations => "images_variations",
            Endpoint::Embeddings => "embeddings",
            Endpoint::AudioTranscriptions => "audio_transcriptions",
            Endpoint::AudioTranslations => "audio_translations",
        }
    }

    /// Ordered field schema.
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Endpoint::Completions => COMPLETIONS,
            Endpoint::ChatCompletions => CHAT_COMPLETIONS,
            Endpoint::Edits => EDITS,
            Endpoint::ImagesGenerations => IMAGES_GENERATIONS,
            Endpoint::ImagesEdits => IMAGES_EDITS,
            Endpoint::ImagesVariations => IMAGES_VARIATIONS,
            Endpoint::Embeddings => EMBEDDINGS,
            Endpoint::AudioTranscriptions => AUDIO_TRANSCRIPTIONS,
            Endpoint::AudioTranslations => AUDIO_TRANSLATIONS,
        }
    }

    /// Path relative to the API base URL.
    pub fn route(self) -> &'static str {
        match self {
            Endpoint::Completions => "/completions",
            Endpoint::ChatCompletions => "/chat/completions",
            Endpoint::Edits => "/edits",
            Endpoint::ImagesGenerations => "/images/generations",
            Endpoint::ImagesEdits => "/images/edits",
            Endpoint::ImagesVariations => "/images/variations",
            Endpoint::Embeddings => "/embeddings",
            Endpoint::AudioTranscriptions => "/audio/transcriptions",
            Endpoint::AudioTranslations => "/audio/translations",
        }
    }

    /// Fields holding local file paths that are uploaded as multipart parts.
    pub fn file_fields(self) -> &'static [&'static str] {
        match self {
            Endpoint::ImagesEdits => &["image", "mask"],
            Endpoint::ImagesVariations => &["image"],
            Endpoint::AudioTranscriptions | Endpoint::AudioTranslations => &["file"],
            _ => &[],
        }
    }

    pub fn is_multipart(self) -> bool {
        !self.file_fields().is_empty()
    }

    /// Fields a prompt template fills in with formatted text.
    pub fn text_fields(self) -> &'static [&'static str] {
        match self {
            Endpoint::Completions
            | Endpoint::ImagesGenerations
            | Endpoint::ImagesEdits
            | Endpoint::AudioTranscriptions
            | Endpoint::AudioTranslations => &["prompt"],
            Endpoint::ChatCompletions => &["messages"],
            Endpoint::Edits => &["input", "instruction"],
            Endpoint::Embeddings => &["input"],
            Endpoint::ImagesVariations => &[],
        }
    }

    /// Canned "v1" payload returned in built-in-test mode.
    pub fn simulated_response(self) -> Value {
        let image_urls = json!({
            "created": 1589478378,
            "data": [
                {"url": "https://random_test_url_424242.co.uk"},
                {"url": "https://random_test_url_424242.co.uk"}
            ]
        });
        match self {
            Endpoint::Completions => json!({
                "id": "cmpl-uqkvlQyYK7bGYrRHQ0eXlWi7",
                "object": "text_completion",
                "created": 1589478378,
                "model": "text-davinci-003",
                "choices": [{
                    "text": "\n\nThis is a test",
                    "index": 0,
                    "logprobs": null,
                    "finish_reason": "length"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
            }),
            Endpoint::ChatCompletions => json!({
                "id": "chatcmpl-abc123",
                "object": "chat.completion",
                "created": 1677858242,
                "model": "gpt-3.5-turbo-0301",
                "choices": [{
                    "message": {"role": "assistant", "content": "\n\nTest"},
                    "finish_reason": "stop",
                    "index": 0
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
            }),
            Endpoint::Edits => json!({
                "object": "edit",
                "created": 1589478378,
                "choices": [{"text": "Test edit response", "index": 0}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
            }),
            Endpoint::ImagesGenerations | Endpoint::ImagesEdits | Endpoint::ImagesVariations => {
                image_urls
            }
            Endpoint::Embeddings => json!({
                "object": "list",
                "model": "text-embedding-ada-002",
                "data": [{
                    "object": "embedding",
                    "embedding": [0.0023064255, -0.009327292, -0.0028842222],
                    "index": 0
                }],
                "usage": {"prompt_tokens": 10, "total_tokens": 20}
            }),
            Endpoint::AudioTranscriptions => json!({"text": "Test transcription response."}),
            Endpoint::AudioTranslations => json!({"text": "Test translation response"}),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for endpoint in Endpoint::ALL {
            assert_eq!(endpoint.name().parse::<Endpoint>(), Ok(endpoint));
        }
        assert!("moderations".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_every_text_field_is_in_schema() {
        for endpoint in Endpoint::ALL {
            for text in endpoint.text_fields() {
                assert!(
                    endpoint.fields().iter().any(|f| f.name == *text),
                    "{} missing {}",
                    endpoint,
                    text
                );
            }
        }
    }

    #[test]
    fn test_float_rejects_integers() {
        assert!(FieldType::Float.accepts(&json!(0.5)));
        assert!(FieldType::Float.accepts(&json!(1.0)));
        assert!(!FieldType::Float.accepts(&json!(1)));
        assert!(FieldType::Int.accepts(&json!(1)));
        assert!(!FieldType::Int.accepts(&json!(true)));
    }

    #[test]
    fn test_simulated_usage_totals() {
        let chat = Endpoint::ChatCompletions.simulated_response();
        assert_eq!(chat["usage"]["total_tokens"], 30);
        assert_eq!(chat["choices"][0]["message"]["content"], "\n\nTest");
        let emb = Endpoint::Embeddings.simulated_response();
        assert_eq!(emb["usage"]["total_tokens"], 20);
        assert!(Endpoint::AudioTranslations.simulated_response()["usage"].is_null());
    }

    #[test]
    fn test_multipart_endpoints() {
        assert!(Endpoint::AudioTranscriptions.is_multipart());
        assert!(Endpoint::ImagesEdits.is_multipart());
        assert!(!Endpoint::ImagesGenerations.is_multipart());
        assert!(!Endpoint::ChatCompletions.is_multipart());
    }
}
