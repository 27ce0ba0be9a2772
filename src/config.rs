use crate::backend::Backend;
use crate::check::{CheckTarget, SampleSource, VerifyMode};
use crate::models::CheckKind;
use crate::samples;
use crate::scheduler::CheckConfig;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::Method;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Periodic antivirus / DLP probe agent", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the antivirus check loop
    Antivirus(AntivirusArgs),
    /// Run the DLP check loop
    Dlp(DlpArgs),
    /// Run both checks concurrently on independent timers
    Combined(CombinedArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AntivirusArgs {
    /// Target URL for the check request (fetched from settings when omitted)
    #[arg(long)]
    pub url: Option<String>,

    /// HTTP method for the check request
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Sample file to upload; without it the target is treated as a
    /// download endpoint
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Existence-check endpoint, queried with ?file=<name> after each upload
    #[arg(long)]
    pub check_url: Option<String>,

    /// Local directory checked for <name> after each upload
    #[arg(long)]
    pub check_dir: Option<PathBuf>,

    /// Path to the JSON file storing results
    #[arg(long, default_value = "antivirus_results.json")]
    pub json: PathBuf,

    /// Seconds between check cycles
    #[arg(long, default_value_t = 3600)]
    pub interval_secs: u64,

    /// Seconds to wait before the existence check
    #[arg(long, default_value_t = 5)]
    pub verify_delay_secs: u64,

    /// Base address of the settings/dashboard server, e.g. http://192.168.1.10
    #[arg(long)]
    pub server: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DlpArgs {
    /// Sample file to upload (repeatable); defaults are generated when absent
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,

    /// Target URL for the check request (fetched from settings when omitted)
    #[arg(long)]
    pub url: Option<String>,

    /// HTTP method for the check request
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Path to the JSON file storing results
    #[arg(long, default_value = "dlp_results.json")]
    pub json: PathBuf,

    /// Seconds between check cycles
    #[arg(long, default_value_t = 3600)]
    pub interval_secs: u64,

    /// Base address of the settings/dashboard server, e.g. http://192.168.1.10
    #[arg(long)]
    pub server: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CombinedArgs {
    /// DLP sample file to upload (repeatable)
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,

    /// Target URL for the antivirus check
    #[arg(long)]
    pub antivirus_url: Option<String>,

    /// Target URL for the DLP check
    #[arg(long)]
    pub dlp_url: Option<String>,

    /// HTTP method for the check requests
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Antivirus sample file; without it the antivirus target is treated as
    /// a download endpoint
    #[arg(long)]
    pub antivirus_file: Option<PathBuf>,

    /// Existence-check endpoint for the antivirus side
    #[arg(long)]
    pub check_url: Option<String>,

    /// Local directory checked after each antivirus upload
    #[arg(long)]
    pub check_dir: Option<PathBuf>,

    /// Path to the antivirus results file
    #[arg(long, default_value = "antivirus_results.json")]
    pub antivirus_json: PathBuf,

    /// Path to the DLP results file
    #[arg(long, default_value = "dlp_results.json")]
    pub dlp_json: PathBuf,

    /// Seconds between antivirus cycles
    #[arg(long, default_value_t = 300)]
    pub antivirus_interval_secs: u64,

    /// Seconds between DLP cycles
    #[arg(long, default_value_t = 300)]
    pub dlp_interval_secs: u64,

    /// Seconds to wait before existence checks
    #[arg(long, default_value_t = 5)]
    pub verify_delay_secs: u64,

    /// Skip the antivirus check
    #[arg(long)]
    pub skip_antivirus: bool,

    /// Skip the DLP check
    #[arg(long)]
    pub skip_dlp: bool,

    /// Base address of the settings/dashboard server, e.g. http://192.168.1.10
    #[arg(long)]
    pub server: Option<String>,
}

/// Resolved startup plan: the check loops to run plus the optional backend.
pub struct Plan {
    pub configs: Vec<CheckConfig>,
    pub backend: Option<Backend>,
}

/// Turns CLI arguments into check configurations, fetching target URLs from
/// the settings endpoint when they were not passed explicitly. Errors here
/// are fatal to startup.
pub async fn build_plan(command: Command) -> Result<Plan> {
    match command {
        Command::Antivirus(args) => {
            let backend = args.server.as_deref().map(Backend::new);
            let url = resolve_url(args.url.clone(), backend.as_ref(), CheckKind::Antivirus).await?;
            let cfg = antivirus_config(
                url,
                &args.method,
                args.file,
                args.check_url,
                args.check_dir,
                args.json,
                args.interval_secs,
                args.verify_delay_secs,
            )?;
            Ok(Plan {
                configs: vec![cfg],
                backend,
            })
        }
        Command::Dlp(args) => {
            let backend = args.server.as_deref().map(Backend::new);
            let url = resolve_url(args.url.clone(), backend.as_ref(), CheckKind::Dlp).await?;
            let cfg = dlp_config(url, &args.method, args.files, args.json, args.interval_secs)?;
            Ok(Plan {
                configs: vec![cfg],
                backend,
            })
        }
        Command::Combined(args) => {
            if args.skip_antivirus && args.skip_dlp {
                bail!("both checks skipped, nothing to do");
            }
            let backend = args.server.as_deref().map(Backend::new);
            let mut configs = Vec::new();

            if !args.skip_antivirus {
                let url = resolve_url(
                    args.antivirus_url.clone(),
                    backend.as_ref(),
                    CheckKind::Antivirus,
                )
                .await?;
                configs.push(antivirus_config(
                    url,
                    &args.method,
                    args.antivirus_file.clone(),
                    args.check_url.clone(),
                    args.check_dir.clone(),
                    args.antivirus_json.clone(),
                    args.antivirus_interval_secs,
                    args.verify_delay_secs,
                )?);
            }
            if !args.skip_dlp {
                let url = resolve_url(args.dlp_url.clone(), backend.as_ref(), CheckKind::Dlp).await?;
                configs.push(dlp_config(
                    url,
                    &args.method,
                    args.files.clone(),
                    args.dlp_json.clone(),
                    args.dlp_interval_secs,
                )?);
            }

            Ok(Plan { configs, backend })
        }
    }
}

/// Explicit URL flag wins; otherwise the settings endpoint is consulted.
async fn resolve_url(
    explicit: Option<String>,
    backend: Option<&Backend>,
    kind: CheckKind,
) -> Result<String> {
    if let Some(url) = explicit {
        if !url.is_empty() {
            return Ok(url);
        }
    }
    let Some(backend) = backend else {
        bail!(
            "{} URL is required: pass --url or --server",
            kind.label()
        );
    };
    let settings = backend.fetch_settings().await?;
    let url = match kind {
        CheckKind::Antivirus => settings.url_antivirus,
        CheckKind::Dlp => settings.url_dlp,
    };
    if url.is_empty() {
        bail!("settings endpoint returned no {} URL", kind.label());
    }
    Ok(url)
}

#[allow(clippy::too_many_arguments)]
fn antivirus_config(
    url: String,
    method: &str,
    file: Option<PathBuf>,
    check_url: Option<String>,
    check_dir: Option<PathBuf>,
    json: PathBuf,
    interval_secs: u64,
    verify_delay_secs: u64,
) -> Result<CheckConfig> {
    let source = match file {
        Some(path) => SampleSource::LocalFile(path),
        None => SampleSource::Download,
    };
    let verify = match (check_url, check_dir) {
        (Some(url), _) => VerifyMode::RemoteUrl(url),
        (None, Some(dir)) => VerifyMode::LocalDir(dir),
        (None, None) => VerifyMode::None,
    };

    Ok(CheckConfig {
        kind: CheckKind::Antivirus,
        sources: vec![source],
        target: CheckTarget {
            url,
            method: parse_method(method)?,
            verify,
        },
        json_path: json,
        interval: Duration::from_secs(interval_secs),
        verify_delay: Duration::from_secs(verify_delay_secs),
        uploads_dir: PathBuf::from("uploads"),
    })
}

fn dlp_config(
    url: String,
    method: &str,
    files: Vec<PathBuf>,
    json: PathBuf,
    interval_secs: u64,
) -> Result<CheckConfig> {
    let files = samples::prepare_files(files, Path::new("."))?;
    let sources = files.into_iter().map(SampleSource::LocalFile).collect();

    Ok(CheckConfig {
        kind: CheckKind::Dlp,
        sources,
        target: CheckTarget {
            url,
            method: parse_method(method)?,
            verify: VerifyMode::None,
        },
        json_path: json,
        interval: Duration::from_secs(interval_secs),
        verify_delay: Duration::from_secs(5),
        uploads_dir: PathBuf::from("uploads"),
    })
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {method}"))
}
