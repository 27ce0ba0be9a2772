use crate::client::{self, CheckClient, ClientError, ExistenceOutcome};
use crate::models::{CheckKind, CheckRequest, CheckResponse, CheckResult};
use reqwest::Method;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Where the sample artifact for a cycle comes from.
#[derive(Debug, Clone)]
pub enum SampleSource {
    /// Upload the contents of a local file.
    LocalFile(PathBuf),
    /// GET the target URL, keep the body as a local copy and verify that
    /// copy persists. Antivirus only.
    Download,
}

/// Optional post-upload existence verification.
#[derive(Debug, Clone)]
pub enum VerifyMode {
    None,
    /// GET `<url>?file=<name>` expecting `{"exists": bool}`.
    RemoteUrl(String),
    /// Look for `<dir>/<name>` on disk.
    LocalDir(PathBuf),
}

/// Target of the primary check request.
#[derive(Debug, Clone)]
pub struct CheckTarget {
    pub url: String,
    pub method: Method,
    pub verify: VerifyMode,
}

/// Runs one full check cycle: read or download the sample, send it, classify
/// the response and optionally verify the artifact landed. Serves both check
/// types; the kind only decides labels and which history entry is written.
pub struct Checker {
    client: CheckClient,
    kind: CheckKind,
    verify_delay: Duration,
    uploads_dir: PathBuf,
}

impl Checker {
    pub fn new(kind: CheckKind, verify_delay: Duration, uploads_dir: PathBuf) -> Self {
        Self {
            client: CheckClient::new(),
            kind,
            verify_delay,
            uploads_dir,
        }
    }

    pub async fn run(&self, source: &SampleSource, target: &CheckTarget) -> CheckResult {
        match source {
            SampleSource::LocalFile(path) => self.run_upload(path, target).await,
            SampleSource::Download => self.run_download(&target.url).await,
        }
    }

    async fn run_upload(&self, path: &Path, target: &CheckTarget) -> CheckResult {
        let payload = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) => {
                // No request goes out when the sample cannot be read.
                return CheckResult {
                    detected: true,
                    status_text: format!("Failed to read file: {err}"),
                    ..CheckResult::default()
                };
            }
        };

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"));
        let sent_name = client::generated_file_name(extension.as_deref());

        let request = CheckRequest {
            payload,
            url: target.url.clone(),
            method: target.method.clone(),
            file_name: Some(sent_name.clone()),
            extension,
        };

        let outcome = self.client.send(&request).await;
        let mut result = evaluate(self.kind, &outcome);

        if let Ok(resp) = outcome {
            if !result.detected {
                let name = if resp.file_name.is_empty() {
                    sent_name
                } else {
                    resp.file_name.clone()
                };
                result.file_name = Some(name.clone());
                self.verify(&mut result, &resp, &name, &target.verify).await;
            }
        }

        result
    }

    async fn run_download(&self, download_url: &str) -> CheckResult {
        let request = CheckRequest {
            payload: String::new(),
            url: download_url.to_string(),
            method: Method::GET,
            file_name: None,
            extension: None,
        };

        let outcome = self.client.send(&request).await;
        let mut result = evaluate(self.kind, &outcome);
        let resp = match outcome {
            Ok(resp) if !result.detected => resp,
            _ => return result,
        };

        let name = if resp.file_name.is_empty() {
            client::generated_file_name(None)
        } else {
            resp.file_name.clone()
        };
        result.file_name = Some(name.clone());

        if let Err(err) = tokio::fs::create_dir_all(&self.uploads_dir).await {
            result.status_text = format!(
                "Request succeeded: {}. Failed to create uploads dir: {err}",
                resp.status_text
            );
            return result;
        }
        let local = self.uploads_dir.join(&name);
        if let Err(err) = tokio::fs::write(&local, &resp.body).await {
            result.status_text = format!(
                "Request succeeded: {}. Failed to write downloaded file: {err}",
                resp.status_text
            );
            return result;
        }
        debug!(path = %local.display(), "stored downloaded artifact");

        tokio::time::sleep(self.verify_delay).await;
        self.verify_local(&mut result, &resp.status_text, &local).await;
        result
    }

    async fn verify(
        &self,
        result: &mut CheckResult,
        resp: &CheckResponse,
        name: &str,
        mode: &VerifyMode,
    ) {
        match mode {
            VerifyMode::None => {}
            VerifyMode::RemoteUrl(check_url) => {
                tokio::time::sleep(self.verify_delay).await;
                self.verify_remote(result, &resp.status_text, name, check_url)
                    .await;
            }
            VerifyMode::LocalDir(dir) => {
                tokio::time::sleep(self.verify_delay).await;
                self.verify_local(result, &resp.status_text, &dir.join(name))
                    .await;
            }
        }
    }

    async fn verify_remote(
        &self,
        result: &mut CheckResult,
        base_status: &str,
        name: &str,
        check_url: &str,
    ) {
        let mut url = match reqwest::Url::parse(check_url) {
            Ok(url) => url,
            Err(err) => {
                result.status_text =
                    format!("Request succeeded: {base_status}. Failed to parse check URL: {err}");
                return;
            }
        };
        url.query_pairs_mut().append_pair("file", name);
        let full = url.to_string();
        result.file_path = Some(full.clone());

        match self.client.remote_exists(&full).await {
            Ok(ExistenceOutcome::Exists) => {
                result.file_exists = true;
                result.status_text =
                    format!("Request succeeded: {base_status}. File exists: {full}");
            }
            Ok(ExistenceOutcome::Missing) => {
                result.status_text =
                    format!("Request succeeded: {base_status}. File not found at: {full}");
            }
            Ok(ExistenceOutcome::Unparseable) => {
                result.status_text = format!(
                    "Request succeeded: {base_status}. Failed to parse check response: {full}"
                );
            }
            Err(ClientError::Body(_)) => {
                result.status_text = format!(
                    "Request succeeded: {base_status}. Failed to read check response: {full}"
                );
            }
            Err(err) => {
                result.status_text = format!(
                    "Request succeeded: {base_status}. Failed to check file existence: {err}"
                );
            }
        }
    }

    async fn verify_local(&self, result: &mut CheckResult, base_status: &str, path: &Path) {
        result.file_path = Some(path.display().to_string());
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        result.file_exists = exists;
        result.status_text = if exists {
            format!(
                "Request succeeded: {base_status}. File exists: {}",
                path.display()
            )
        } else {
            format!(
                "Request succeeded: {base_status}. File not found at: {}",
                path.display()
            )
        };
    }
}

/// Maps the primary send outcome onto a result. A transport failure is
/// reported as a detection: the absence of a response is read as the gateway
/// having intercepted the upload.
pub fn evaluate(kind: CheckKind, outcome: &Result<CheckResponse, ClientError>) -> CheckResult {
    match outcome {
        Err(err) => CheckResult {
            detected: true,
            status_text: format!("{} blocked request: {err}", kind.label()),
            ..CheckResult::default()
        },
        Ok(resp) => CheckResult {
            detected: false,
            status_text: format!("Request succeeded: {}", resp.status_text),
            ..CheckResult::default()
        },
    }
}
