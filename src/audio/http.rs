//! JSON-over-HTTP speech synthesis and audio library clients.
//!
//! Synthesis: `POST {endpoint}` with a [`SpeechRequest`] body, answered by
//! `{"url": "...", "confidence": 0.93}`.
//! Library: `GET {endpoint}?text=...&language=...`, answered by the same
//! shape, or 404 when nothing matches.

use super::{AudioHit, AudioLibrary, SpeechRequest, SpeechSynthesizer};
use crate::error::{ReadLevelError, Result};
use crate::openai::preview;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const USER_AGENT: &str = concat!("readlevel/", env!("CARGO_PKG_VERSION"));

/// Library lookups send at most this many characters of the text.
const LOOKUP_TEXT_CHARS: usize = 500;

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint)
        .map_err(|e| ReadLevelError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))
}

/// Map a non-success status to an error; 5xx and 429 are retryable.
fn status_error(service: &str, status: StatusCode, body: &str) -> ReadLevelError {
    let body = preview(body, 200);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ReadLevelError::Config(format!("{} rejected credentials ({}): {}", service, status, body))
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            ReadLevelError::ExternalService(format!("{} returned {}: {}", service, status, body))
        }
        _ => ReadLevelError::Validation(format!("{} refused request ({}): {}", service, status, body)),
    }
}

fn check_hit(service: &str, hit: AudioHit) -> Result<AudioHit> {
    Url::parse(&hit.url).map_err(|e| {
        ReadLevelError::ExternalService(format!("{} returned invalid URL '{}': {}", service, hit.url, e))
    })?;
    Ok(hit)
}

/// Speech synthesizer behind an HTTP endpoint.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpSynthesizer {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
            api_key,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    #[instrument(skip(self, request), fields(endpoint = %self.endpoint, voice = %request.voice))]
    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioHit> {
        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Speech service", status, &body));
        }

        let hit: AudioHit = response.json().await?;
        debug!("Synthesized audio at {}", hit.url);
        check_hit("Speech service", hit)
    }
}

/// Audio library behind an HTTP endpoint.
pub struct HttpAudioLibrary {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpAudioLibrary {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
        })
    }
}

#[async_trait]
impl AudioLibrary for HttpAudioLibrary {
    #[instrument(skip(self, text), fields(endpoint = %self.endpoint))]
    async fn lookup(&self, text: &str, language: &str) -> Result<Option<AudioHit>> {
        let excerpt: String = text.chars().take(LOOKUP_TEXT_CHARS).collect();
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("text", excerpt.as_str()), ("language", language)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Library has no recording");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Audio library", status, &body));
        }

        let hit: AudioHit = response.json().await?;
        check_hit("Audio library", hit).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioQuality;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn speech_request() -> SpeechRequest {
        SpeechRequest {
            text: "Hello there.".into(),
            language: "en".into(),
            voice: "female".into(),
            speed: 1.0,
            quality: AudioQuality::Medium,
        }
    }

    #[tokio::test]
    async fn test_synthesizer_round_trip() {
        let router = Router::new().route(
            "/tts",
            post(|headers: HeaderMap, Json(req): Json<SpeechRequest>| async move {
                let authed = headers
                    .get("authorization")
                    .map(|v| v == "Bearer secret")
                    .unwrap_or(false);
                Json(serde_json::json!({
                    "url": format!("https://audio.example.com/{}.mp3", req.voice),
                    "confidence": if authed { 0.9 } else { 0.1 },
                }))
            }),
        );
        let base = serve(router).await;

        let synth = HttpSynthesizer::new(&format!("{}/tts", base), Some("secret".into()), Duration::from_secs(5)).unwrap();
        let hit = synth.synthesize(&speech_request()).await.unwrap();

        assert_eq!(hit.url, "https://audio.example.com/female.mp3");
        assert_eq!(hit.confidence, Some(0.9));
    }

    #[tokio::test]
    async fn test_synthesizer_server_error_is_transient() {
        let router = Router::new().route(
            "/tts",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let base = serve(router).await;

        let synth = HttpSynthesizer::new(&format!("{}/tts", base), None, Duration::from_secs(5)).unwrap();
        let err = synth.synthesize(&speech_request()).await.unwrap_err();

        assert!(matches!(err, ReadLevelError::ExternalService(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_library_lookup_hit_and_miss() {
        let router = Router::new().route(
            "/audio",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("text").map(|t| t.contains("known")).unwrap_or(false) {
                    Ok(Json(serde_json::json!({
                        "url": format!("https://library.example.com/{}.mp3", params["language"]),
                    })))
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }),
        );
        let base = serve(router).await;
        let library = HttpAudioLibrary::new(&format!("{}/audio", base), Duration::from_secs(5)).unwrap();

        let hit = library.lookup("a known story", "fr").await.unwrap().unwrap();
        assert_eq!(hit.url, "https://library.example.com/fr.mp3");
        assert_eq!(hit.confidence, None);

        assert!(library.lookup("something else", "en").await.unwrap().is_none());
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error("x", StatusCode::TOO_MANY_REQUESTS, ""),
            ReadLevelError::ExternalService(_)
        ));
        assert!(matches!(
            status_error("x", StatusCode::UNAUTHORIZED, ""),
            ReadLevelError::Config(_)
        ));
        assert!(matches!(
            status_error("x", StatusCode::BAD_REQUEST, ""),
            ReadLevelError::Validation(_)
        ));
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            HttpAudioLibrary::new("not a url", Duration::from_secs(1)),
            Err(ReadLevelError::Config(_))
        ));
    }
}
