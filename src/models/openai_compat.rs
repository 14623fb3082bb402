//! OpenAI-compatible chat completions client.
//!
//! Talks to OpenAI directly or to any local server exposing the same API
//! (LM Studio, vLLM, llama.cpp). Two structured-output modes are supported:
//! a forced `Answer` function call whose schema enumerates the options, and
//! a plain completion whose JSON answer is pulled out of a markdown block.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::traits::AnswerModel;
use crate::config::{EvalSettings, ModelConfig, ModelMode};
use crate::errors::ModelError;
use crate::questions::Question;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that can answer questions. \
You will be given a question and a list of options. \
Your task is to select the best answer from the options.";

const ANSWER_TOOL_NAME: &str = "Answer";

/// Error bodies are truncated to this many chars in `StatusError`
const MAX_ERROR_BODY_CHARS: usize = 500;

/// A model client for one OpenAI-compatible endpoint and model.
pub struct OpenAiCompatClient {
    api_key: Option<String>,
    api_base: String,
    model: String,
    mode: ModelMode,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

impl OpenAiCompatClient {
    /// Create a client with default sampling (temperature 0.9, 256 tokens).
    pub fn new(model: &str, api_base: &str, api_key: Option<String>, mode: ModelMode) -> Self {
        Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            mode,
            temperature: 0.9,
            max_tokens: 256,
            client: Client::new(),
        }
    }

    /// Build from a `[[models]]` entry, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &ModelConfig, settings: &EvalSettings) -> Result<Self, ModelError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| ModelError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ModelError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            ..Self::new(&config.model, &config.api_base, api_key, config.mode)
        }
        .with_sampling(settings.temperature, settings.max_tokens))
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn mode(&self) -> ModelMode {
        self.mode
    }

    /// Request body for one answer.
    pub fn build_request_body(&self, question: &Question, prefixes: &[String]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(question, prefixes) },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        if self.mode == ModelMode::Tools {
            body["tools"] = json!([answer_tool(&question.options)]);
            body["tool_choice"] = json!({
                "type": "function",
                "function": { "name": ANSWER_TOOL_NAME }
            });
        }
        body
    }
}

/// User prompt listing the prefixed options and the required answer format.
pub fn build_user_prompt(question: &Question, prefixes: &[String]) -> String {
    let option_lines = question
        .options
        .iter()
        .enumerate()
        .map(|(i, opt)| {
            let prefix = prefixes.get(i).map(String::as_str).unwrap_or("");
            format!("{} {}", prefix, opt)
        })
        .collect::<Vec<_>>()
        .join("\n    ");

    let allowed = question
        .options
        .iter()
        .map(|opt| format!("\"{}\"", opt))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Question: {}\nOptions:\n    {}\n\nYour answer must be in the following format:\n\n{{\n  \"answer\": \"The answer\"\n}}\n\nAnswers must be the full text of the option, not just the prefix.\n\nThe answer must be one of the options: {}",
        question.prompt, option_lines, allowed
    )
}

/// Function definition restricting `answer` to the presented options.
fn answer_tool(options: &[String]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": ANSWER_TOOL_NAME,
            "description": "The selected option, copied exactly",
            "parameters": {
                "type": "object",
                "properties": {
                    "answer": { "type": "string", "enum": options }
                },
                "required": ["answer"]
            }
        }
    })
}

/// Pull the answer string out of a chat completions response.
///
/// Tool-call arguments are preferred; message content is the fallback
/// (and the only source in `MdJson` mode).
pub fn parse_answer(data: &Value, mode: ModelMode) -> Result<String, ModelError> {
    let message = data
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ModelError::JsonParseError("response has no choices[0].message".into()))?;

    if mode == ModelMode::Tools {
        let arguments = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .and_then(|calls| {
                calls.iter().find(|call| {
                    call.pointer("/function/name").and_then(|n| n.as_str())
                        == Some(ANSWER_TOOL_NAME)
                })
            })
            .and_then(|call| call.pointer("/function/arguments"));

        if let Some(arguments) = arguments {
            // Arguments are a JSON string per the API, but some servers inline the object.
            let parsed: Value = match arguments {
                Value::String(s) => serde_json::from_str(s)
                    .map_err(|e| ModelError::JsonParseError(e.to_string()))?,
                other => other.clone(),
            };
            return answer_field(&parsed);
        }
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .ok_or(ModelError::MissingAnswer)?;
    let object = extract_json_object(content).ok_or(ModelError::MissingAnswer)?;
    let parsed: Value =
        serde_json::from_str(object).map_err(|e| ModelError::JsonParseError(e.to_string()))?;
    answer_field(&parsed)
}

fn answer_field(parsed: &Value) -> Result<String, ModelError> {
    parsed
        .get("answer")
        .and_then(|a| a.as_str())
        .map(|a| a.to_string())
        .ok_or(ModelError::MissingAnswer)
}

/// Locate the JSON object in a completion: a fenced ```json block if there
/// is one, otherwise the outermost `{...}` span.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let search = match text.find("```") {
        Some(fence) => {
            let after = &text[fence + 3..];
            // Skip the info string ("json") up to the end of the line
            let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
            let body = &after[body_start..];
            match body.find("```") {
                Some(end) => &body[..end],
                None => body,
            }
        }
        None => text,
    };

    let start = search.find('{')?;
    let end = search.rfind('}')?;
    if end < start {
        return None;
    }
    Some(search[start..=end].trim())
}

/// Accept `answer` only if it is one of `options` (surrounding whitespace ignored).
pub fn validate_answer(answer: &str, options: &[String]) -> Result<String, ModelError> {
    let trimmed = answer.trim();
    options
        .iter()
        .find(|opt| opt.as_str() == trimmed)
        .cloned()
        .ok_or_else(|| ModelError::InvalidAnswer {
            answer: answer.to_string(),
        })
}

#[async_trait]
impl AnswerModel for OpenAiCompatClient {
    async fn answer(&self, question: &Question, prefixes: &[String]) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request_body(question, prefixes);

        debug!(
            "answer: api_base={} model={} mode={} question={}",
            self.api_base,
            self.model,
            self.mode.name(),
            question.name
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::HttpError(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ModelError::ResponseReadError(e.to_string()))?;

        if !status.is_success() {
            return Err(ModelError::StatusError {
                status: status.as_u16(),
                message: response_text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let data: Value = serde_json::from_str(&response_text)
            .map_err(|e| ModelError::JsonParseError(e.to_string()))?;

        let answer = parse_answer(&data, self.mode)?;
        validate_answer(&answer, &question.options)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelId;

    fn planet_question() -> Question {
        Question::factual(
            "Largest Planet",
            "What is the largest planet?",
            vec!["Earth", "Mars", "Jupiter", "Saturn"],
            "Jupiter",
        )
    }

    fn lettered() -> Vec<String> {
        vec!["A. ".into(), "B. ".into(), "C. ".into(), "D. ".into()]
    }

    // ── prompt / request tests ───────────────────────────────────

    #[test]
    fn test_user_prompt_lists_prefixed_options() {
        let prompt = build_user_prompt(&planet_question(), &lettered());
        assert!(prompt.starts_with("Question: What is the largest planet?"));
        assert!(prompt.contains("A.  Earth\n    B.  Mars\n    C.  Jupiter\n    D.  Saturn"));
        assert!(prompt.contains("\"Earth\", \"Mars\", \"Jupiter\", \"Saturn\""));
        assert!(prompt.contains("not just the prefix"));
    }

    #[test]
    fn test_user_prompt_tolerates_missing_prefixes() {
        let prompt = build_user_prompt(&planet_question(), &["- ".to_string()]);
        assert!(prompt.contains("-  Earth\n     Mars"));
    }

    #[test]
    fn test_tools_request_body_has_enum_schema() {
        let client =
            OpenAiCompatClient::new("gpt-4o", "https://api.openai.com/v1/", None, ModelMode::Tools);
        let body = client.build_request_body(&planet_question(), &lettered());

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["temperature"], 0.9);
        assert_eq!(
            body.pointer("/tools/0/function/parameters/properties/answer/enum"),
            Some(&json!(["Earth", "Mars", "Jupiter", "Saturn"]))
        );
        assert_eq!(body["tool_choice"]["function"]["name"], "Answer");
    }

    #[test]
    fn test_md_json_request_body_has_no_tools() {
        let client =
            OpenAiCompatClient::new("llama", "http://localhost:1234/v1", None, ModelMode::MdJson)
                .with_sampling(0.2, 64);
        let body = client.build_request_body(&planet_question(), &lettered());
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["temperature"], 0.2);
    }

    #[test]
    fn test_from_config_without_key() {
        let config = ModelConfig {
            id: ModelId::Llama,
            model: "llama-3.2-3b-instruct".into(),
            api_base: "http://localhost:1234/v1".into(),
            api_key_env: None,
            mode: ModelMode::MdJson,
        };
        let client = OpenAiCompatClient::from_config(&config, &EvalSettings::default()).unwrap();
        assert_eq!(client.model_name(), "llama-3.2-3b-instruct");
        assert_eq!(client.mode(), ModelMode::MdJson);
    }

    #[test]
    fn test_from_config_missing_key_env() {
        let config = ModelConfig {
            id: ModelId::Gpt4o,
            model: "gpt-4o".into(),
            api_base: "https://api.openai.com/v1".into(),
            api_key_env: Some("ORDER_DEPENDENCY_TEST_UNSET_KEY".into()),
            mode: ModelMode::Tools,
        };
        let err = OpenAiCompatClient::from_config(&config, &EvalSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::MissingApiKey(_)));
    }

    // ── parse_answer tests ───────────────────────────────────────

    #[test]
    fn test_parse_tool_call_arguments() {
        let data = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "Answer",
                            "arguments": "{\"answer\": \"Jupiter\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        assert_eq!(parse_answer(&data, ModelMode::Tools).unwrap(), "Jupiter");
    }

    #[test]
    fn test_parse_tool_call_inline_object() {
        let data = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": { "name": "Answer", "arguments": { "answer": "Mars" } }
                    }]
                }
            }]
        });
        assert_eq!(parse_answer(&data, ModelMode::Tools).unwrap(), "Mars");
    }

    #[test]
    fn test_parse_tool_mode_falls_back_to_content() {
        let data = json!({
            "choices": [{ "message": { "content": "{\"answer\": \"Saturn\"}" } }]
        });
        assert_eq!(parse_answer(&data, ModelMode::Tools).unwrap(), "Saturn");
    }

    #[test]
    fn test_parse_md_json_fenced() {
        let data = json!({
            "choices": [{
                "message": {
                    "content": "Sure!\n```json\n{\n  \"answer\": \"Earth\"\n}\n```\nHope that helps."
                }
            }]
        });
        assert_eq!(parse_answer(&data, ModelMode::MdJson).unwrap(), "Earth");
    }

    #[test]
    fn test_parse_malformed_arguments() {
        let data = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": { "name": "Answer", "arguments": "{\"answer\": " }
                    }]
                }
            }]
        });
        assert!(matches!(
            parse_answer(&data, ModelMode::Tools),
            Err(ModelError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_parse_missing_answer() {
        let no_json = json!({ "choices": [{ "message": { "content": "I think C." } }] });
        assert!(matches!(
            parse_answer(&no_json, ModelMode::MdJson),
            Err(ModelError::MissingAnswer)
        ));

        let wrong_key = json!({ "choices": [{ "message": { "content": "{\"choice\": \"C\"}" } }] });
        assert!(matches!(
            parse_answer(&wrong_key, ModelMode::MdJson),
            Err(ModelError::MissingAnswer)
        ));

        let no_choices = json!({ "error": "boom" });
        assert!(matches!(
            parse_answer(&no_choices, ModelMode::MdJson),
            Err(ModelError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("{\"a\": 1}"), Some("{\"a\": 1}"));
        assert_eq!(
            extract_json_object("text ```json\n{\"a\": 1}\n``` more {junk}"),
            Some("{\"a\": 1}")
        );
        assert_eq!(extract_json_object("```\n{\"a\": 2}"), Some("{\"a\": 2}"));
        assert_eq!(extract_json_object("no braces"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    // ── validate_answer tests ────────────────────────────────────

    #[test]
    fn test_validate_answer() {
        let options = planet_question().options;
        assert_eq!(validate_answer("Jupiter", &options).unwrap(), "Jupiter");
        assert_eq!(validate_answer("  Jupiter\n", &options).unwrap(), "Jupiter");
        assert!(matches!(
            validate_answer("C. Jupiter", &options),
            Err(ModelError::InvalidAnswer { .. })
        ));
        assert!(validate_answer("C", &options).is_err());
        assert!(validate_answer("jupiter", &options).is_err());
    }

    #[tokio::test]
    #[ignore = "requires an OpenAI-compatible server at http://localhost:1234/v1"]
    async fn test_local_server_answer() {
        let client = OpenAiCompatClient::new(
            "llama-3.2-3b-instruct",
            "http://localhost:1234/v1",
            None,
            ModelMode::MdJson,
        );
        let q = planet_question();
        let answer = client.answer(&q, &lettered()).await.unwrap();
        assert!(q.options.contains(&answer));
    }
}
