//! Text-to-speech clients.
//!
//! The primary voice is OpenAI's speech endpoint, which returns audio
//! bytes synchronously. The fallback is FPT.AI's Vietnamese TTS, which is
//! asynchronous: the request returns a future audio URL and FPT later
//! POSTs a callback to this server once the file is rendered. Delivering
//! that callback to the waiting browser is the gateway's job.

use crate::config::Config;
use crate::error::AppError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// FPT's answer to a synthesis request: the URL the audio will appear at.
#[derive(Debug, Clone, Deserialize)]
pub struct FptSpeechResponse {
    #[serde(rename = "async")]
    pub async_url: String,
    pub request_id: String,
    #[serde(default)]
    pub error: i32,
}

#[derive(Clone)]
pub struct SpeechClient {
    http: Client,
    openai_base_url: String,
    openai_api_key: String,
    tts_model: String,
    tts_voice: String,
    fpt_url: String,
    fpt_api_key: Option<String>,
    fpt_voice: String,
    callback_base_url: Option<String>,
}

impl SpeechClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            openai_base_url: config.openai_base_url.clone(),
            openai_api_key: config.openai_api_key.clone(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
            fpt_url: config.fpt_tts_url.clone(),
            fpt_api_key: config.fpt_tts_api_key.clone(),
            fpt_voice: config.fpt_tts_voice.clone(),
            callback_base_url: config.callback_base_url.clone(),
        }
    }

    /// Synthesizes `text` through OpenAI, returning AAC bytes.
    pub async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>, AppError> {
        let url = format!("{}/audio/speech", self.openai_base_url);
        let payload = json!({
            "model": self.tts_model,
            "voice": self.tts_voice,
            "input": text,
            "response_format": "aac",
        });

        let res = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.openai_api_key)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Speech request failed with status {}: {}",
                status, body
            )));
        }

        Ok(res.bytes().await?.to_vec())
    }

    /// Requests asynchronous synthesis from FPT.AI. The audio is not ready
    /// when this returns; FPT fetches it to `async_url` and then calls
    /// back to `/v1/speech/fpt-callback`.
    pub async fn request_fpt_speech(&self, text: &str) -> Result<FptSpeechResponse, AppError> {
        let api_key = self.fpt_api_key.as_deref().ok_or_else(|| {
            AppError::Config("FPT_TTS_API_KEY is not set (required for the fallback voice)".to_string())
        })?;

        let mut request = self
            .http
            .post(&self.fpt_url)
            .timeout(REQUEST_TIMEOUT)
            .header("api-key", api_key)
            .header("voice", &self.fpt_voice)
            .header("speed", "")
            .body(text.to_string());

        if let Some(base) = &self.callback_base_url {
            request = request.header(
                "callback_url",
                format!("{}/v1/speech/fpt-callback", base.trim_end_matches('/')),
            );
        }

        let res = request.send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "FPT TTS request failed with status {}: {}",
                status, body
            )));
        }

        let parsed: FptSpeechResponse = res
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed FPT TTS response: {}", e)))?;

        if parsed.error != 0 {
            return Err(AppError::Upstream(format!(
                "FPT TTS reported error code {}",
                parsed.error
            )));
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(openai_base: String, fpt_url: String) -> SpeechClient {
        SpeechClient {
            http: Client::new(),
            openai_base_url: openai_base,
            openai_api_key: "sk-test".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            fpt_url,
            fpt_api_key: Some("fpt-test".to_string()),
            fpt_voice: "banmai".to_string(),
            callback_base_url: Some("https://api.admichat.example".to_string()),
        }
    }

    #[tokio::test]
    async fn openai_speech_returns_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xffu8, 0xf1, 0x00]))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), String::new());
        let bytes = client.synthesize_openai("xin chào").await.unwrap();
        assert_eq!(bytes, vec![0xff, 0xf1, 0x00]);
    }

    #[tokio::test]
    async fn fpt_request_sends_voice_and_callback_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("api-key", "fpt-test"))
            .and(header("voice", "banmai"))
            .and(header(
                "callback_url",
                "https://api.admichat.example/v1/speech/fpt-callback",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "async": "https://file.fpt.ai/text2speech/abc.mp3",
                "request_id": "req-1",
                "error": 0
            })))
            .mount(&server)
            .await;

        let client = test_client(String::new(), server.uri());
        let res = client.request_fpt_speech("xin chào").await.unwrap();
        assert_eq!(res.request_id, "req-1");
        assert!(res.async_url.ends_with(".mp3"));
    }

    #[tokio::test]
    async fn fpt_error_code_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "async": "",
                "request_id": "req-2",
                "error": 5
            })))
            .mount(&server)
            .await;

        let client = test_client(String::new(), server.uri());
        let err = client.request_fpt_speech("x").await.unwrap_err();
        assert!(err.to_string().contains("error code 5"));
    }

    #[tokio::test]
    async fn missing_fpt_key_is_a_config_error() {
        let mut client = test_client(String::new(), String::new());
        client.fpt_api_key = None;
        let err = client.request_fpt_speech("x").await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
