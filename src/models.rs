use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which gateway a probe cycle is exercising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Antivirus,
    Dlp,
}

impl CheckKind {
    /// Human-facing label used in status texts.
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::Antivirus => "Antivirus",
            CheckKind::Dlp => "DLP",
        }
    }

    /// Lowercase name used in logs and dashboard endpoint paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Antivirus => "antivirus",
            CheckKind::Dlp => "dlp",
        }
    }
}

/// One outgoing probe request. Built fresh each cycle.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub payload: String,
    pub url: String,
    pub method: reqwest::Method,
    /// Explicit `file_name` field value; a timestamp name is generated when absent.
    pub file_name: Option<String>,
    /// Extension appended to generated names, including the dot.
    pub extension: Option<String>,
}

/// Response to one probe request.
#[derive(Debug, Clone)]
pub struct CheckResponse {
    pub status_code: u16,
    /// Status line, e.g. `200 OK`.
    pub status_text: String,
    pub body: Vec<u8>,
    /// Server-reported file name when present, otherwise the name we sent.
    pub file_name: String,
}

/// Outcome of one check cycle.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub detected: bool,
    pub status_text: String,
    pub file_name: Option<String>,
    pub file_exists: bool,
    /// Path or URL the existence check looked at.
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntivirusEntry {
    pub timestamp: DateTime<Utc>,
    pub file_name: String,
    pub status_text: String,
    pub is_virus_detected: bool,
    pub file_exists: bool,
    pub file_path: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub file_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlpEntry {
    pub timestamp: DateTime<Utc>,
    pub status_text: String,
    pub is_dlp_active: bool,
    pub file_name: String,
    pub category: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub file_content: String,
}

/// Payload of `GET /api/settings-agent`.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsResponse {
    #[serde(default)]
    pub success: bool,
    pub data: SettingsData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsData {
    #[serde(default)]
    pub url_dlp: String,
    #[serde(default)]
    pub url_antivirus: String,
}

/// Classifies a DLP sample by its file name.
pub fn category_for(file_name: &str) -> &'static str {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name)
        .to_lowercase();

    if base.contains("credit_card") {
        "credit_card"
    } else if base.contains("passport") {
        "passport_number"
    } else if base.ends_with(".csv") {
        "file_upload_csv"
    } else if base.ends_with(".xlsx") {
        "file_upload_xlsx"
    } else {
        "unknown"
    }
}
