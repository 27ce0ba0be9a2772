use crate::models::{CheckRequest, CheckResponse};
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build request: {0}")]
    Build(#[source] reqwest::Error),
    #[error("failed to execute request: {0}")]
    Send(#[source] reqwest::Error),
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// What a remote existence probe reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceOutcome {
    Exists,
    Missing,
    Unparseable,
}

/// HTTP client for probe requests against the antivirus / DLP gateways.
#[derive(Debug, Clone, Default)]
pub struct CheckClient {
    client: reqwest::Client,
}

impl CheckClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Sends one check request and resolves the server-side file name.
    ///
    /// POST and PUT carry a multipart body with `file` and `file_name`
    /// fields; GET and everything else send no body. The resolved name on
    /// the response comes from the `Content-Disposition` header for GET,
    /// from the JSON body for other methods, falling back to the sent name.
    pub async fn send(&self, req: &CheckRequest) -> Result<CheckResponse, ClientError> {
        let sent_name = sent_file_name(req);

        let builder = if req.method == Method::POST || req.method == Method::PUT {
            let form = Form::new()
                .part("file", Part::text(req.payload.clone()).file_name("test.txt"))
                .text("file_name", sent_name.clone());
            self.client
                .request(req.method.clone(), &req.url)
                .multipart(form)
        } else {
            self.client.request(req.method.clone(), &req.url)
        };

        let request = builder.build().map_err(ClientError::Build)?;
        let resp = self
            .client
            .execute(request)
            .await
            .map_err(ClientError::Send)?;

        let status = resp.status();
        let status_text = status.to_string();
        let disposition = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = resp.bytes().await.map_err(ClientError::Body)?.to_vec();

        let mut file_name = sent_name;
        if req.method == Method::GET {
            if let Some(name) = disposition.as_deref().and_then(disposition_file_name) {
                file_name = name;
            }
        } else if let Some(name) = json_file_name(&body) {
            file_name = name;
        }

        Ok(CheckResponse {
            status_code: status.as_u16(),
            status_text,
            body,
            file_name,
        })
    }

    /// Asks an existence-check endpoint whether `url` (already carrying the
    /// `file` query parameter) knows about the uploaded artifact.
    pub async fn remote_exists(&self, url: &str) -> Result<ExistenceOutcome, ClientError> {
        let resp = self.client.get(url).send().await.map_err(ClientError::Send)?;
        let body = resp.bytes().await.map_err(ClientError::Body)?;

        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(value) => match value.get("exists").and_then(|v| v.as_bool()) {
                Some(true) => Ok(ExistenceOutcome::Exists),
                _ => Ok(ExistenceOutcome::Missing),
            },
            Err(_) => Ok(ExistenceOutcome::Unparseable),
        }
    }
}

/// Timestamp-based file name, e.g. `2025_11_22_13_00_45.txt`.
pub fn generated_file_name(extension: Option<&str>) -> String {
    let stamp = chrono::Local::now().format("%Y_%m_%d_%H_%M_%S").to_string();
    match extension {
        Some(ext) if !ext.is_empty() => format!("{stamp}{ext}"),
        _ => stamp,
    }
}

fn sent_file_name(req: &CheckRequest) -> String {
    match req.file_name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => generated_file_name(req.extension.as_deref()),
    }
}

/// Pulls the file name out of `attachment; filename="report.txt"`.
fn disposition_file_name(value: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"filename="?([^"]+)"?"#).expect("filename regex"));
    re.captures(value).map(|caps| caps[1].trim().to_string())
}

/// Probes a JSON body for the server's file name, trying `file_name`,
/// `fileName` and `filename` in that order.
fn json_file_name(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    for key in ["file_name", "fileName", "filename"] {
        if let Some(name) = value.get(key).and_then(|v| v.as_str()) {
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}
