//! HTTP implementation of the voice-turn exchange.
//!
//! ## Wire contract
//!
//! `POST {endpoint}/voice_turn`, multipart/form-data with the WAV payload
//! under the `audio_file` field. Success is a binary WAV body plus two
//! custom headers: `X-Transcript` (raw ASCII) and `X-Response-Text-Encoded`
//! (percent-encoded so non-ASCII reply text survives header transport; the
//! encoding is part of the contract, do not change it). Failure is a
//! non-200 status with a JSON body `{"detail": string}`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::{ClientError, Result, VoiceBackend, VoiceTurnReply};

const VOICE_TURN_PATH: &str = "/voice_turn";
const AUDIO_FIELD: &str = "audio_file";
const TRANSCRIPT_HEADER: &str = "x-transcript";
const RESPONSE_TEXT_HEADER: &str = "x-response-text-encoded";

/// Client for a voice-agent backend speaking the `/voice_turn` protocol.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    /// Create a new client for the given backend base URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn turn_url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), VOICE_TURN_PATH)
    }
}

#[async_trait]
impl VoiceBackend for HttpBackend {
    async fn exchange(&self, audio: Bytes) -> Result<VoiceTurnReply> {
        debug!(
            audio_bytes = audio.len(),
            url = %self.turn_url(),
            "Sending voice turn to backend"
        );

        let form = reqwest::multipart::Form::new().part(
            AUDIO_FIELD,
            reqwest::multipart::Part::bytes(audio.to_vec())
                .file_name("recording.wav")
                .mime_str("audio/wav")?,
        );

        let response = self.client.post(self.turn_url()).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Backend {
                status,
                detail: detail_from_body(&body),
            });
        }

        let transcript = header_text(response.headers(), TRANSCRIPT_HEADER)?;
        let encoded = header_text(response.headers(), RESPONSE_TEXT_HEADER)?;
        let response_text = decode_reply_text(&encoded)?;
        let audio = response.bytes().await?;

        debug!(
            transcript_len = transcript.len(),
            response_len = response_text.len(),
            reply_bytes = audio.len(),
            "Voice turn reply received"
        );

        Ok(VoiceTurnReply {
            transcript,
            response_text,
            audio,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Read a reply header as text. A missing header reads as empty (the
/// backend strips transcripts down to nothing for pure-noise input); bytes
/// that are not visible ASCII are an error.
fn header_text(headers: &HeaderMap, name: &str) -> Result<String> {
    match headers.get(name) {
        None => Ok(String::new()),
        Some(value) => value
            .to_str()
            .map(str::to_owned)
            .map_err(|_| ClientError::BadHeader(format!("{name} is not valid header text"))),
    }
}

/// Percent-decode the assistant reply text carried in
/// `X-Response-Text-Encoded`.
pub fn decode_reply_text(encoded: &str) -> Result<String> {
    urlencoding::decode(encoded)
        .map(|cow| cow.into_owned())
        .map_err(|e| ClientError::BadHeader(format!("reply text is not percent-decodable: {e}")))
}

/// Extract the backend's error detail from a JSON `{"detail": ...}` body,
/// falling back to a generic message.
pub fn detail_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| "backend request failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_ascii() {
        assert_eq!(decode_reply_text("hola%20mundo").unwrap(), "hola mundo");
        assert_eq!(decode_reply_text("hello").unwrap(), "hello");
        assert_eq!(decode_reply_text("").unwrap(), "");
    }

    #[test]
    fn decode_multilingual_reply() {
        // "नमस्ते" percent-encoded, as the backend emits for Hindi replies.
        let encoded = "%E0%A4%A8%E0%A4%AE%E0%A4%B8%E0%A5%8D%E0%A4%A4%E0%A5%87";
        assert_eq!(decode_reply_text(encoded).unwrap(), "नमस्ते");
    }

    #[test]
    fn decode_rejects_broken_utf8() {
        // %FF is not valid UTF-8 once decoded.
        assert!(matches!(
            decode_reply_text("%FF%FE"),
            Err(ClientError::BadHeader(_))
        ));
    }

    #[test]
    fn detail_parsed_from_json_body() {
        assert_eq!(detail_from_body(r#"{"detail":"stt failed"}"#), "stt failed");
    }

    #[test]
    fn detail_falls_back_on_non_json() {
        assert_eq!(detail_from_body("<html>gateway timeout</html>"), "backend request failed");
        assert_eq!(detail_from_body(""), "backend request failed");
        // JSON, but detail is not a string
        assert_eq!(detail_from_body(r#"{"detail":{"code":9}}"#), "backend request failed");
    }

    #[test]
    fn turn_url_normalizes_trailing_slash() {
        let backend = HttpBackend::new("http://127.0.0.1:8000/");
        assert_eq!(backend.turn_url(), "http://127.0.0.1:8000/voice_turn");

        let backend = HttpBackend::new("http://127.0.0.1:8000");
        assert_eq!(backend.turn_url(), "http://127.0.0.1:8000/voice_turn");
    }

    #[test]
    fn missing_headers_read_as_empty() {
        let headers = HeaderMap::new();
        assert_eq!(header_text(&headers, TRANSCRIPT_HEADER).unwrap(), "");
    }
}
