use super::OracleError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Transport to the external decision service
///
/// One call is one attempt; retry policy lives in `DecisionOracleClient`.
#[allow(async_fn_in_trait)]
pub trait DecisionModel {
    async fn complete(&mut self, system: &str, prompt: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions endpoint
pub struct HttpDecisionModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl HttpDecisionModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: String,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_tokens,
        })
    }
}

impl DecisionModel for HttpDecisionModel {
    async fn complete(&mut self, system: &str, prompt: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Transport(format!("JSON decode error: {}", e)))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!("[ORACLE_RAW_RESPONSE]\n{}", text);

        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        Ok(text)
    }
}

/// Replays canned responses in order, for backtests and tests
///
/// `Err` entries fail that attempt as a transport error. Once the script is
/// used up the fallback response is repeated, or every call fails if there
/// is none.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    script: VecDeque<Result<String, String>>,
    fallback: Option<String>,
    calls: usize,
    prompts: Vec<String>,
}

impl ScriptedModel {
    pub fn new(script: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: None,
            calls: 0,
            prompts: Vec::new(),
        }
    }

    /// Answer every call with the same text
    pub fn always(response: impl Into<String>) -> Self {
        Self::default().with_fallback(response)
    }

    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Number of completions requested so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// User prompts received so far, oldest first
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl DecisionModel for ScriptedModel {
    async fn complete(&mut self, _system: &str, prompt: &str) -> Result<String, OracleError> {
        self.calls += 1;
        self.prompts.push(prompt.to_string());

        match self.script.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(cause)) => Err(OracleError::Transport(cause)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| OracleError::Transport("script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_model_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"{\"signal\":\"HOLD\"}"}}]}"#)
            .create_async()
            .await;

        let mut model = HttpDecisionModel::new(
            format!("{}/v1", server.url()),
            "test-key".to_string(),
            "gpt-4o-mini",
            512,
            Duration::from_secs(5),
        )
        .unwrap();

        let text = model.complete("system", "prompt").await.unwrap();
        mock.assert_async().await;
        assert_eq!(text, r#"{"signal":"HOLD"}"#);
    }

    #[tokio::test]
    async fn test_http_model_status_and_empty_body() {
        let mut server = mockito::Server::new_async().await;
        let _limited = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .expect(1)
            .create_async()
            .await;

        let mut model =
            HttpDecisionModel::new(server.url(), "k".to_string(), "m", 16, Duration::from_secs(5)).unwrap();
        let err = model.complete("s", "p").await.unwrap_err();
        assert!(matches!(err, OracleError::Status { status: 429, .. }));

        server.reset();
        let _empty = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"   "}}]}"#)
            .create_async()
            .await;
        let err = model.complete("s", "p").await.unwrap_err();
        assert!(matches!(err, OracleError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_scripted_model_replays_then_falls_back() {
        let mut model = ScriptedModel::new(vec![Err("timeout".to_string()), Ok("first".to_string())])
            .with_fallback("again");

        assert!(model.complete("", "").await.is_err());
        assert_eq!(model.complete("", "").await.unwrap(), "first");
        assert_eq!(model.complete("", "").await.unwrap(), "again");
        assert_eq!(model.calls(), 3);
    }
}
