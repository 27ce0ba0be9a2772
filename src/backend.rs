use crate::models::{CheckKind, SettingsData, SettingsResponse};
use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tracing::{debug, info, warn};

/// Port the management server listens on unless the address names one.
const DEFAULT_PORT: u16 = 8000;

/// Management-server collaborator: settings discovery at startup and
/// per-cycle dashboard uploads of the history file.
#[derive(Debug, Clone)]
pub struct Backend {
    client: reqwest::Client,
    base: String,
}

impl Backend {
    /// `server` is the base address, e.g. `http://192.168.1.10`; port 8000
    /// is assumed when none is given.
    pub fn new(server: &str) -> Self {
        let trimmed = server.trim_end_matches('/');
        let base = match reqwest::Url::parse(trimmed) {
            Ok(url) if url.port().is_some() => trimmed.to_string(),
            _ => format!("{trimmed}:{DEFAULT_PORT}"),
        };
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    /// Fetches check-target URLs from the management server. Any failure
    /// here is fatal to startup.
    pub async fn fetch_settings(&self) -> Result<SettingsData> {
        let url = format!("{}/api/settings-agent", self.base);
        info!(%url, "fetching agent settings");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to fetch settings")?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .context("failed to read settings response")?;

        // Reject HTML error pages before handing them to the JSON parser so
        // the operator sees what the server actually said.
        if !body.is_empty() && body[0] != b'{' && body[0] != b'[' {
            let preview = String::from_utf8_lossy(&body[..body.len().min(200)]);
            bail!("server returned non-JSON settings response (status {status}): {preview}");
        }

        let settings: SettingsResponse =
            serde_json::from_slice(&body).context("failed to parse settings response")?;
        Ok(settings.data)
    }

    /// Re-uploads the just-written history file to the dashboard endpoint
    /// for `kind`. Failures are logged, never retried.
    pub async fn upload_history(&self, kind: CheckKind, path: &Path) {
        let url = format!("{}/api/{}/get-data", self.base, kind.as_str());

        let body = match std::fs::read(path) {
            Ok(body) => body,
            Err(err) => {
                warn!(kind = kind.as_str(), error = %err, "failed to read history file for dashboard upload");
                return;
            }
        };

        match self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(kind = kind.as_str(), "history uploaded to dashboard");
            }
            Ok(resp) => {
                warn!(kind = kind.as_str(), status = %resp.status(), "dashboard rejected history upload");
            }
            Err(err) => {
                warn!(kind = kind.as_str(), error = %err, "failed to upload history to dashboard");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn default_port_applies_only_without_an_explicit_one() {
        assert_eq!(Backend::new("http://10.0.0.5/").base, "http://10.0.0.5:8000");
        assert_eq!(Backend::new("http://10.0.0.5:9000").base, "http://10.0.0.5:9000");
    }

    #[tokio::test]
    async fn settings_fetch_parses_the_payload() {
        let app = Router::new().route(
            "/api/settings-agent",
            get(|| async {
                Json(json!({
                    "success": true,
                    "data": {
                        "url_dlp": "http://dlp.local/scan",
                        "url_antivirus": "http://av.local/scan"
                    }
                }))
            }),
        );
        let base = serve(app).await;

        let settings = Backend::new(&base).fetch_settings().await.unwrap();
        assert_eq!(settings.url_dlp, "http://dlp.local/scan");
        assert_eq!(settings.url_antivirus, "http://av.local/scan");
    }

    #[tokio::test]
    async fn settings_fetch_rejects_non_json_bodies() {
        let app = Router::new().route(
            "/api/settings-agent",
            get(|| async { "<html>502 Bad Gateway</html>" }),
        );
        let base = serve(app).await;

        let err = Backend::new(&base).fetch_settings().await.unwrap_err();
        assert!(err.to_string().contains("non-JSON"), "got: {err}");
    }

    #[tokio::test]
    async fn history_upload_posts_the_raw_file() {
        let received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        async fn ingest(State(sink): State<Arc<Mutex<Vec<u8>>>>, body: Bytes) -> &'static str {
            *sink.lock().unwrap() = body.to_vec();
            "ok"
        }

        let app = Router::new()
            .route("/api/antivirus/get-data", post(ingest))
            .with_state(sink);
        let base = serve(app).await;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("antivirus_results.json");
        std::fs::write(&path, br#"{"results": []}"#).unwrap();

        Backend::new(&base)
            .upload_history(CheckKind::Antivirus, &path)
            .await;

        assert_eq!(&*received.lock().unwrap(), br#"{"results": []}"#);
    }

    #[tokio::test]
    async fn history_upload_swallows_transport_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dlp_results.json");
        std::fs::write(&path, br#"{"results": []}"#).unwrap();

        // Must not panic or error; upload failures are log-only.
        Backend::new("http://127.0.0.1:1")
            .upload_history(CheckKind::Dlp, &path)
            .await;
    }
}
