//! `GeminiTutor`: [`TutorClient`] backed by the Gemini REST API.
//!
//! Text replies, speech synthesis and the credential probe all go through
//! `POST {base_url}/models/{model}:generateContent?key=…`; only the model and
//! the generation config differ.  The API key is read from the
//! [`CredentialStore`] on every call, so clearing it takes effect at once.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::conversation::{Level, Topic, Voice};
use crate::store::{CredentialProbe, CredentialStore};
use crate::tutor::client::{HistoryTurn, TutorClient, TutorError, TutorRole};
use crate::tutor::prompt::PromptBuilder;
use crate::tutor::speech::speakable_text;

/// Prompt sent by the credential probe.
const PROBE_PROMPT: &str = "Hi";
/// Output cap for the credential probe.
const PROBE_MAX_TOKENS: u32 = 5;

// ---------------------------------------------------------------------------
// GeminiTutor
// ---------------------------------------------------------------------------

/// Calls Gemini for replies and speech.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use ai_teacher::config::GeminiConfig;
/// use ai_teacher::store::{CredentialStore, MemoryStore};
/// use ai_teacher::tutor::GeminiTutor;
///
/// let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
/// let tutor = GeminiTutor::from_config(&GeminiConfig::default(), credentials);
/// ```
pub struct GeminiTutor {
    client: reqwest::Client,
    config: GeminiConfig,
    credentials: CredentialStore,
    prompt_builder: PromptBuilder,
}

impl GeminiTutor {
    /// Build a client with the per-request timeout from `config`.
    ///
    /// A default (no-timeout) client is used if the builder fails.
    pub fn from_config(config: &GeminiConfig, credentials: CredentialStore) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            credentials,
            prompt_builder: PromptBuilder::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate(
        &self,
        api_key: &str,
        model: &str,
        body: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, TutorError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| TutorError::Parse(e.to_string()))
    }

    /// Body for a tutor reply request.
    fn reply_request<'a>(
        &self,
        system: &'a str,
        utterance: &'a str,
        history: &'a [HistoryTurn],
    ) -> GenerateContentRequest<'a> {
        let mut contents: Vec<Content<'a>> = history
            .iter()
            .map(|turn| Content::new(Some(turn.role.as_str()), &turn.text))
            .collect();
        contents.push(Content::new(Some(TutorRole::User.as_str()), utterance));

        GenerateContentRequest {
            contents,
            system_instruction: Some(SystemInstruction {
                parts: vec![TextPart { text: system }],
            }),
            generation_config: GenerationConfig {
                temperature: Some(self.config.temperature),
                top_p: Some(self.config.top_p),
                ..GenerationConfig::default()
            },
        }
    }
}

#[async_trait]
impl TutorClient for GeminiTutor {
    async fn request_reply(
        &self,
        utterance: &str,
        history: &[HistoryTurn],
        level: Level,
        topic: Topic,
    ) -> Result<String, TutorError> {
        let api_key = self.credentials.load().ok_or(TutorError::NoCredential)?;

        let system = self.prompt_builder.system_instruction(level, topic);
        let body = self.reply_request(&system, utterance, history);

        log::debug!(
            "tutor: requesting reply ({} history turns, level={}, topic={})",
            history.len(),
            level.short_name(),
            topic
        );

        let response = self
            .generate(&api_key, &self.config.chat_model, &body)
            .await
            .inspect_err(|e| log::error!("tutor: reply request failed: {e}"))?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(TutorError::EmptyReply);
        }
        Ok(text)
    }

    async fn request_speech(&self, text: &str, voice: Voice) -> Option<Vec<u8>> {
        let spoken = speakable_text(text);
        if spoken.is_empty() {
            log::debug!("tutor: nothing speakable in reply, skipping synthesis");
            return None;
        }

        let Some(api_key) = self.credentials.load() else {
            log::warn!("tutor: no API key, skipping synthesis");
            return None;
        };

        let body = GenerateContentRequest {
            contents: vec![Content::new(None, spoken)],
            system_instruction: None,
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["AUDIO"]),
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.name(),
                        },
                    },
                }),
                ..GenerationConfig::default()
            },
        };

        let response = match self.generate(&api_key, &self.config.tts_model, &body).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("tutor: speech synthesis failed: {e}");
                return None;
            }
        };

        let Some(encoded) = response.inline_audio() else {
            log::warn!("tutor: speech response carried no audio");
            return None;
        };

        match BASE64_STANDARD.decode(encoded) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                log::warn!("tutor: speech payload is not valid base64: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl CredentialProbe for GeminiTutor {
    async fn probe(&self, candidate: &str) -> bool {
        let body = GenerateContentRequest {
            contents: vec![Content::new(Some(TutorRole::User.as_str()), PROBE_PROMPT)],
            system_instruction: None,
            generation_config: GenerationConfig {
                max_output_tokens: Some(PROBE_MAX_TOKENS),
                ..GenerationConfig::default()
            },
        };

        match self.generate(candidate, &self.config.probe_model, &body).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("tutor: API key validation failed: {e}");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_http_error(status: StatusCode, body: &str) -> TutorError {
    if status.is_server_error() {
        return TutorError::TransientServer {
            status: status.as_u16(),
        };
    }

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || body.contains("API_KEY_INVALID")
        || body.contains("API key not valid")
    {
        return TutorError::InvalidCredential;
    }

    let message = serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|w| w.error.message)
        .unwrap_or_else(|| body.chars().take(200).collect());
    TutorError::Request(format!("HTTP {}: {message}", status.as_u16()))
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<TextPart<'a>>,
}

impl<'a> Content<'a> {
    fn new(role: Option<&'a str>, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![TextPart { text }],
        }
    }
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.first_parts()
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect()
    }

    /// Base64 payload of the first inline-data part of the first candidate.
    fn inline_audio(&self) -> Option<&str> {
        self.first_parts()
            .iter()
            .find_map(|part| part.inline_data.as_ref())
            .map(|inline| inline.data.as_str())
    }

    fn first_parts(&self) -> &[ResponsePart] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    const KEY: &str = "AIzaSyTestKey123456";
    const CHAT_PATH: &str = "/models/gemini-2.0-flash:generateContent";
    const TTS_PATH: &str = "/models/gemini-2.5-flash-preview-tts:generateContent";

    fn make_tutor(base_url: String, key: Option<&str>) -> GeminiTutor {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
        if let Some(key) = key {
            credentials.save(key).unwrap();
        }
        let config = GeminiConfig {
            base_url,
            timeout_secs: 5,
            ..GeminiConfig::default()
        };
        GeminiTutor::from_config(&config, credentials)
    }

    fn text_response(text: &str) -> serde_json::Value {
        json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn reply_request_shape() {
        let tutor = make_tutor("http://localhost".into(), Some(KEY));
        let history = vec![
            HistoryTurn::new(TutorRole::User, "Hi"),
            HistoryTurn::new(TutorRole::Model, "Hello! How are you?"),
        ];
        let body = tutor.reply_request("SYSTEM", "I am fine", &history);
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["contents"].as_array().unwrap().len(), 3);
        assert_eq!(value["contents"][1]["role"], "model");
        assert_eq!(value["contents"][2]["role"], "user");
        assert_eq!(value["contents"][2]["parts"][0]["text"], "I am fine");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "SYSTEM");
        let temperature = value["generationConfig"]["temperature"].as_f64().unwrap();
        let top_p = value["generationConfig"]["topP"].as_f64().unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
        assert!((top_p - 0.95).abs() < 1e-6);
        assert!(value["generationConfig"].get("responseModalities").is_none());
    }

    #[test]
    fn http_error_mapping() {
        assert!(matches!(
            map_http_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            TutorError::TransientServer { status: 500 }
        ));
        assert!(matches!(
            map_http_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
            TutorError::TransientServer { status: 503 }
        ));
        assert!(matches!(
            map_http_error(
                StatusCode::BAD_REQUEST,
                r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#
            ),
            TutorError::InvalidCredential
        ));
        assert!(matches!(
            map_http_error(StatusCode::FORBIDDEN, ""),
            TutorError::InvalidCredential
        ));
        match map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"quota exceeded"}}"#,
        ) {
            TutorError::Request(msg) => assert!(msg.contains("quota exceeded")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn reply_without_credential_fails_fast() {
        let tutor = make_tutor("http://127.0.0.1:9".into(), None);
        let err = tutor
            .request_reply("Hello", &[], Level::Beginner, Topic::General)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::NoCredential));
    }

    #[tokio::test]
    async fn reply_success_returns_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(CHAT_PATH).query_param("key", KEY);
                then.status(200)
                    .json_body(text_response("Hi! How are you?\n🇰🇷 번역: 안녕! 어떻게 지내?"));
            })
            .await;

        let tutor = make_tutor(server.base_url(), Some(KEY));
        let reply = tutor
            .request_reply("Hello", &[], Level::Beginner, Topic::General)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(reply.starts_with("Hi! How are you?"));
    }

    #[tokio::test]
    async fn reply_server_error_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(CHAT_PATH);
                then.status(500).body("internal");
            })
            .await;

        let tutor = make_tutor(server.base_url(), Some(KEY));
        let err = tutor
            .request_reply("Hello", &[], Level::Beginner, Topic::General)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::TransientServer { status: 500 }));
    }

    #[tokio::test]
    async fn reply_with_bad_key_is_invalid_credential() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(CHAT_PATH);
                then.status(400).json_body(json!({
                    "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT",
                               "details": [{ "reason": "API_KEY_INVALID" }] }
                }));
            })
            .await;

        let tutor = make_tutor(server.base_url(), Some(KEY));
        let err = tutor
            .request_reply("Hello", &[], Level::Beginner, Topic::General)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::InvalidCredential));
    }

    #[tokio::test]
    async fn reply_without_candidates_is_empty_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(CHAT_PATH);
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;

        let tutor = make_tutor(server.base_url(), Some(KEY));
        let err = tutor
            .request_reply("Hello", &[], Level::Beginner, Topic::General)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::EmptyReply));
    }

    #[tokio::test]
    async fn speech_decodes_inline_audio() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(TTS_PATH).query_param("key", KEY);
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{
                        "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000",
                                        "data": BASE64_STANDARD.encode([1u8, 2, 3, 4]) }
                    }] } }]
                }));
            })
            .await;

        let tutor = make_tutor(server.base_url(), Some(KEY));
        let audio = tutor
            .request_speech("Hello there! 💡 Correction: none", Voice::Puck)
            .await;

        mock.assert_async().await;
        assert_eq!(audio, Some(vec![1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn speech_failure_is_swallowed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TTS_PATH);
                then.status(503);
            })
            .await;

        let tutor = make_tutor(server.base_url(), Some(KEY));
        assert!(tutor.request_speech("Hello", Voice::Kore).await.is_none());
    }

    #[tokio::test]
    async fn speech_with_only_markers_is_empty() {
        // Unroutable base URL: any attempted call would also yield None, but
        // the speakable-text check returns before building a request.
        let tutor = make_tutor("http://127.0.0.1:9".into(), Some(KEY));
        assert!(tutor
            .request_speech("💡 Correction: x", Voice::Kore)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn speech_without_credential_is_none() {
        let tutor = make_tutor("http://127.0.0.1:9".into(), None);
        assert!(tutor.request_speech("Hello", Voice::Kore).await.is_none());
    }

    #[tokio::test]
    async fn probe_accepts_working_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(CHAT_PATH).query_param("key", KEY);
                then.status(200).json_body(text_response("Hi"));
            })
            .await;

        let tutor = make_tutor(server.base_url(), None);
        assert!(tutor.probe(KEY).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn probe_rejects_bad_key() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(CHAT_PATH);
                then.status(400).body("API_KEY_INVALID");
            })
            .await;

        let tutor = make_tutor(server.base_url(), None);
        assert!(!tutor.probe("garbage").await);
    }
}
