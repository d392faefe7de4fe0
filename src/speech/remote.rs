//! Remote text-to-speech HTTP client
//!
//! Sends `POST <endpoint>` with a JSON body `{ "text", "voice_id" }` and an
//! `api-key` header. The response body is the synthesized audio.

use crate::config::SpeechConfig;
use crate::error::SpeechError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Header carrying the API key
const API_KEY_HEADER: &str = "api-key";

/// Remote synthesis seam
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    /// Synthesize `text` into playable audio bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

/// Request body for the synthesis endpoint
#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
}

/// HTTP client for the remote synthesis API
#[derive(Debug, Clone)]
pub struct RemoteTtsClient {
    endpoint: String,
    api_key: String,
    voice_id: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteTtsClient {
    /// Create a client with full configuration
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Synthesis URL
    /// * `api_key` - Value of the `api-key` header
    /// * `voice_id` - Remote voice identifier
    /// * `timeout_secs` - Request timeout in seconds
    pub fn with_config(
        endpoint: &str,
        api_key: &str,
        voice_id: &str,
        timeout_secs: u64,
    ) -> Result<Self, SpeechError> {
        if endpoint.trim().is_empty() || api_key.trim().is_empty() {
            return Err(SpeechError::NotConfigured);
        }
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpeechError::ConnectionFailed(e.to_string()))?;
        Ok(Self::with_client(client, endpoint, api_key, voice_id, timeout))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_client(
        client: reqwest::Client,
        endpoint: &str,
        api_key: &str,
        voice_id: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            voice_id: voice_id.to_string(),
            client,
            timeout,
        }
    }

    /// Build from settings
    ///
    /// Returns `Ok(None)` when remote synthesis is disabled or no API key is
    /// configured, so the network is never touched.
    pub fn from_config(config: &SpeechConfig) -> Result<Option<Self>, SpeechError> {
        if !config.remote_enabled {
            tracing::debug!("Remote synthesis disabled in settings");
            return Ok(None);
        }
        let Some(api_key) = config.effective_api_key() else {
            tracing::info!("No remote synthesis API key configured, using local speech only");
            return Ok(None);
        };
        let endpoint = config
            .endpoint_url()
            .map_err(SpeechError::ConnectionFailed)?;

        Self::with_config(
            endpoint.as_str(),
            &api_key,
            &config.voice_id,
            config.timeout_secs,
        )
        .map(Some)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl RemoteSynthesizer for RemoteTtsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let request = SynthesisRequest {
            text,
            voice_id: &self.voice_id,
        };

        tracing::debug!(
            "Requesting remote synthesis ({} chars, voice {})",
            text.len(),
            self.voice_id
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Timeout(self.timeout.as_secs())
                } else {
                    SpeechError::ConnectionFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SpeechError::ServerError { status, message });
        }

        let audio = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                SpeechError::Timeout(self.timeout.as_secs())
            } else {
                SpeechError::ConnectionFailed(e.to_string())
            }
        })?;

        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the raw request text
    async fn serve_once(
        status_line: &'static str,
        body: &'static [u8],
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/speech/generate", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }

            let head = format!(
                "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(body).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, handle)
    }

    fn client(url: &str) -> RemoteTtsClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        RemoteTtsClient::with_client(http, url, "test-key", "en-US-marcus", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_synthesize_posts_text_and_key() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", b"RIFFdata").await;

        let audio = client(&url).synthesize("Opening courses").await.unwrap();
        assert_eq!(audio, b"RIFFdata".to_vec());

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /v1/speech/generate"));
        assert!(lower.contains("api-key: test-key"));
        assert!(request.contains("\"text\":\"Opening courses\""));
        assert!(request.contains("\"voice_id\":\"en-US-marcus\""));
    }

    #[tokio::test]
    async fn test_non_success_status_is_server_error() {
        let (url, _server) = serve_once("HTTP/1.1 401 Unauthorized", b"bad key").await;

        let err = client(&url).synthesize("hello").await.unwrap_err();
        match err {
            SpeechError::ServerError { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_an_error() {
        let (url, _server) = serve_once("HTTP/1.1 200 OK", b"").await;
        let err = client(&url).synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::EmptyAudio));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let err = client(&url).synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::ConnectionFailed(_)));
    }

    #[test]
    fn test_from_config_without_key_skips_network() {
        let config = SpeechConfig {
            api_key: None,
            ..Default::default()
        };
        // Only meaningful when the environment does not provide a key
        if std::env::var(crate::config::API_KEY_ENV).is_err() {
            assert!(RemoteTtsClient::from_config(&config).unwrap().is_none());
        }

        let config = SpeechConfig {
            remote_enabled: false,
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(RemoteTtsClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_blank_credentials_are_not_configured() {
        let err =
            RemoteTtsClient::with_config("https://tts.invalid/", "  ", "voice", 5).unwrap_err();
        assert!(matches!(err, SpeechError::NotConfigured));

        let err = RemoteTtsClient::with_config("", "key", "voice", 5).unwrap_err();
        assert!(matches!(err, SpeechError::NotConfigured));
    }

    #[test]
    fn test_from_config_with_key() {
        let config = SpeechConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        let client = RemoteTtsClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.endpoint(), "https://api.murf.ai/v1/speech/generate");
        assert_eq!(client.timeout(), Duration::from_secs(15));
    }
}
