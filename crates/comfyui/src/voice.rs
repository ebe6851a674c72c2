//! REST client for the voice synthesis service.
//!
//! Cloned voices go through `POST /voice/synthesize`; characters without a
//! voice sample are rendered from their speech pattern via `POST /tts`.
//! Both endpoints answer with raw audio bytes.

use serde::Serialize;
use storyreel_core::screenplay::{SpeechPattern, VoiceClone};

use crate::api::ComfyServiceError;

const DEFAULT_LANGUAGE: &str = "th";

#[derive(Debug, Serialize)]
struct CloneSynthesisBody<'a> {
    text: &'a str,
    voice_id: &'a str,
    language: &'a str,
    speed: f64,
}

#[derive(Debug, Serialize)]
struct PatternSynthesisBody<'a> {
    text: &'a str,
    dialect: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    accent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    formality: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    personality: Option<&'a str>,
}

pub struct VoiceServiceApi {
    client: reqwest::Client,
    api_url: String,
}

impl VoiceServiceApi {
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Synthesize `text` with a cloned voice.
    pub async fn synthesize_clone(
        &self,
        text: &str,
        voice: &VoiceClone,
    ) -> Result<Vec<u8>, ComfyServiceError> {
        let body = CloneSynthesisBody {
            text,
            voice_id: &voice.sample_id,
            language: voice.language.as_deref().unwrap_or(DEFAULT_LANGUAGE),
            speed: 1.0,
        };
        let response = self
            .client
            .post(format!("{}/voice/synthesize", self.api_url))
            .json(&body)
            .send()
            .await?;
        Self::audio_bytes(response).await
    }

    /// Synthesize `text` from a speech pattern description.
    pub async fn synthesize_pattern(
        &self,
        text: &str,
        pattern: &SpeechPattern,
    ) -> Result<Vec<u8>, ComfyServiceError> {
        let body = PatternSynthesisBody {
            text,
            dialect: &pattern.dialect,
            accent: pattern.accent.as_deref(),
            formality: pattern.formality.as_deref(),
            personality: pattern.personality.as_deref(),
        };
        let response = self
            .client
            .post(format!("{}/tts", self.api_url))
            .json(&body)
            .send()
            .await?;
        Self::audio_bytes(response).await
    }

    async fn audio_bytes(response: reqwest::Response) -> Result<Vec<u8>, ComfyServiceError> {
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let body = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(text);
            return Err(ComfyServiceError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
