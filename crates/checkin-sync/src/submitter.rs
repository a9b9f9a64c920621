//! # Check-In Submitter
//!
//! The request executor: one [`ScanPayload`] in, one of three answers out.
//!
//! ## Response Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    HTTP → SubmitResponse                                │
//! │                                                                         │
//! │  POST {base_url}/contexts/{contextId}/check-ins                        │
//! │  { "code", "contextId", "deviceId", "scannedAt" }                      │
//! │       │                                                                 │
//! │       ├── 2xx ─────────────────────────────► Accepted(record)          │
//! │       │                                                                 │
//! │       ├── 408 / 425 / 429 / 5xx ───────────► TransientFailure          │
//! │       ├── 401 / 403 (token expired) ───────► TransientFailure          │
//! │       ├── connect error / timeout ─────────► TransientFailure          │
//! │       │                                                                 │
//! │       └── other 4xx ───────────────────────► Rejected(reason)          │
//! │              reason = body.code | body.error | body.message | status   │
//! │                                                                         │
//! │  Transient → the pipeline queues the scan                              │
//! │  Rejected  → shown immediately, never queued                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use checkin_core::{CheckInRecord, ScanPayload};

use crate::config::ServiceSettings;
use crate::error::{CheckInError, CheckInResult};

// =============================================================================
// Submit Response
// =============================================================================

/// What the service said about one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// The check-in was recorded.
    Accepted(CheckInRecord),

    /// The service refused the check-in. Retrying will not help.
    Rejected(String),

    /// The answer is unknown (network, timeout, overload). Retry later.
    TransientFailure(String),
}

impl SubmitResponse {
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, SubmitResponse::TransientFailure(_))
    }
}

/// Submits a payload to the check-in service.
///
/// Implementations never return an error: every failure is classified as
/// rejected or transient.
#[async_trait]
pub trait CheckInSubmitter: Send + Sync {
    async fn submit(&self, payload: &ScanPayload) -> SubmitResponse;
}

// =============================================================================
// HTTP Submitter
// =============================================================================

/// [`CheckInSubmitter`] backed by the service's REST API.
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpSubmitter {
    pub fn new(settings: &ServiceSettings) -> CheckInResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CheckInError::InvalidUrl(settings.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .build()?;

        Ok(HttpSubmitter {
            client,
            base_url,
            api_token: settings.api_token.clone(),
        })
    }

    /// `{base_url}/contexts/{context_id}/check-ins`, with the context id
    /// percent-encoded as one path segment.
    pub fn endpoint(&self, context_id: &str) -> CheckInResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CheckInError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["contexts", context_id, "check-ins"]);
        Ok(url)
    }
}

#[async_trait]
impl CheckInSubmitter for HttpSubmitter {
    async fn submit(&self, payload: &ScanPayload) -> SubmitResponse {
        let url = match self.endpoint(payload.context_id()) {
            Ok(url) => url,
            Err(e) => return SubmitResponse::TransientFailure(e.to_string()),
        };

        let mut request = self.client.post(url).json(payload);
        if let Some(ref token) = self.api_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                debug!(code = %payload.code(), reason = %reason, "Submission did not reach the service");
                return SubmitResponse::TransientFailure(reason);
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            // Headers arrived but the body did not; for a 2xx we still know the outcome
            Err(e) if !status.is_success() => {
                return SubmitResponse::TransientFailure(format!("HTTP {}: {}", status, e))
            }
            Err(_) => String::new(),
        };

        classify(status, &body, payload)
    }
}

/// Maps an HTTP status and body to a [`SubmitResponse`].
pub fn classify(status: StatusCode, body: &str, payload: &ScanPayload) -> SubmitResponse {
    if status.is_success() {
        let record = serde_json::from_str::<CheckInRecord>(body)
            .map(|mut record| {
                if record.code.is_empty() {
                    record.code = payload.code().to_string();
                }
                if record.context_id.is_empty() {
                    record.context_id = payload.context_id().to_string();
                }
                record
            })
            .unwrap_or_else(|_| CheckInRecord::acknowledged(payload));
        return SubmitResponse::Accepted(record);
    }

    if is_transient_status(status) {
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!(status = %status, "Check-in service refused credentials; keeping scan for replay");
        }
        return SubmitResponse::TransientFailure(format!("HTTP {}", status));
    }

    SubmitResponse::Rejected(rejection_reason(status, body))
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        // 425 Too Early
        || status.as_u16() == 425
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
        )
        // 1xx/3xx are not answers to a POST we can act on
        || status.is_informational()
        || status.is_redirection()
}

fn rejection_reason(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["code", "error", "message"] {
            if let Some(reason) = value.get(key).and_then(|v| v.as_str()) {
                if !reason.trim().is_empty() {
                    return reason.trim().to_string();
                }
            }
        }
    }

    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn payload() -> ScanPayload {
        ScanPayload::new("EVT-42", "session-7", "device-1", Utc::now()).unwrap()
    }

    #[test]
    fn test_classify_success() {
        let body = r#"{"id":"ci-1","code":"EVT-42","contextId":"session-7","attendeeName":"Ada"}"#;
        match classify(StatusCode::CREATED, body, &payload()) {
            SubmitResponse::Accepted(record) => {
                assert_eq!(record.id.as_deref(), Some("ci-1"));
                assert_eq!(record.attendee_name.as_deref(), Some("Ada"));
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_success_without_body() {
        match classify(StatusCode::NO_CONTENT, "", &payload()) {
            SubmitResponse::Accepted(record) => {
                assert_eq!(record.code, "EVT-42");
                assert_eq!(record.context_id, "session-7");
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_transient_statuses() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
        ] {
            assert!(
                classify(status, "", &payload()).is_transient(),
                "{} should be transient",
                status
            );
        }
    }

    #[test]
    fn test_classify_rejections() {
        assert_eq!(
            classify(StatusCode::CONFLICT, r#"{"code":"ALREADY_CHECKED_IN"}"#, &payload()),
            SubmitResponse::Rejected("ALREADY_CHECKED_IN".into())
        );
        assert_eq!(
            classify(StatusCode::NOT_FOUND, r#"{"message":"Unknown ticket"}"#, &payload()),
            SubmitResponse::Rejected("Unknown ticket".into())
        );
        assert_eq!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, "<html>", &payload()),
            SubmitResponse::Rejected("Unprocessable Entity".into())
        );
    }

    #[test]
    fn test_endpoint_encodes_context() {
        let settings = ServiceSettings {
            base_url: "https://events.example.com/api/".into(),
            ..Default::default()
        };
        let submitter = HttpSubmitter::new(&settings).unwrap();

        assert_eq!(
            submitter.endpoint("session-7").unwrap().as_str(),
            "https://events.example.com/api/contexts/session-7/check-ins"
        );
        assert_eq!(
            submitter.endpoint("a/b").unwrap().as_str(),
            "https://events.example.com/api/contexts/a%2Fb/check-ins"
        );
    }

    #[test]
    fn test_rejects_non_http_url() {
        let settings = ServiceSettings {
            base_url: "ftp://events.example.com".into(),
            ..Default::default()
        };
        assert!(HttpSubmitter::new(&settings).is_err());
    }

    /// Serves one canned HTTP response and returns the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];

            // read headers, then Content-Length bytes of body
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| {
                            let l = l.to_ascii_lowercase();
                            l.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length || n == 0 {
                        break;
                    }
                } else if n == 0 {
                    break;
                }
            }

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&request).to_string()
        });

        (base, task)
    }

    fn submitter_for(base: String, token: Option<&str>) -> HttpSubmitter {
        HttpSubmitter::new(&ServiceSettings {
            base_url: base,
            api_token: token.map(str::to_string),
            request_timeout_secs: 5,
            connect_timeout_secs: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_http_accepted() {
        let (base, server) = serve_once("HTTP/1.1 201 Created", r#"{"id":"ci-1"}"#).await;
        let submitter = submitter_for(base, Some("secret"));

        let response = submitter.submit(&payload()).await;
        assert!(matches!(response, SubmitResponse::Accepted(ref r) if r.id.as_deref() == Some("ci-1")));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/contexts/session-7/check-ins"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains(r#""contextId":"session-7""#));
        assert!(request.contains(r#""deviceId":"device-1""#));
    }

    #[tokio::test]
    async fn test_http_rejected() {
        let (base, server) =
            serve_once("HTTP/1.1 409 Conflict", r#"{"code":"ALREADY_CHECKED_IN"}"#).await;
        let submitter = submitter_for(base, None);

        assert_eq!(
            submitter.submit(&payload()).await,
            SubmitResponse::Rejected("ALREADY_CHECKED_IN".into())
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_unreachable_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());
        drop(listener);

        let submitter = submitter_for(base, None);
        assert!(submitter.submit(&payload()).await.is_transient());
    }
}
