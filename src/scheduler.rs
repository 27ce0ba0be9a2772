use crate::backend::Backend;
use crate::check::{CheckTarget, Checker, SampleSource};
use crate::history;
use crate::models::{category_for, AntivirusEntry, CheckKind, CheckResult, DlpEntry};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Everything one check loop needs; built once from the CLI and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub kind: CheckKind,
    /// Samples cycled through each tick. One for antivirus, several for DLP.
    pub sources: Vec<SampleSource>,
    pub target: CheckTarget,
    pub json_path: PathBuf,
    pub interval: Duration,
    pub verify_delay: Duration,
    pub uploads_dir: PathBuf,
}

/// Runs check cycles immediately and then on every interval tick until the
/// shutdown channel flips. A cycle in flight (including its verification
/// delay) always finishes and writes its history entry; shutdown is only
/// observed between cycles.
pub async fn run_check_loop(
    cfg: CheckConfig,
    backend: Option<Backend>,
    mut shutdown: watch::Receiver<bool>,
    detected: Arc<AtomicBool>,
) {
    let checker = Checker::new(cfg.kind, cfg.verify_delay, cfg.uploads_dir.clone());
    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        kind = cfg.kind.as_str(),
        interval_secs = cfg.interval.as_secs(),
        "check loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_cycle_once(&checker, &cfg, backend.as_ref(), &detected).await;
            }
            _ = shutdown.changed() => {
                info!(kind = cfg.kind.as_str(), "check loop stopping");
                break;
            }
        }
    }
}

/// One full tick: run every configured sample through the checker, append
/// each outcome to the history file and push it to the dashboard.
pub(crate) async fn run_cycle_once(
    checker: &Checker,
    cfg: &CheckConfig,
    backend: Option<&Backend>,
    detected: &AtomicBool,
) {
    for source in &cfg.sources {
        let result = checker.run(source, &cfg.target).await;
        if result.detected {
            detected.store(true, Ordering::Relaxed);
        }

        if let Err(err) = append_result(cfg, source, &result) {
            warn!(kind = cfg.kind.as_str(), error = %err, "failed to save check result");
        }
        if let Some(backend) = backend {
            backend.upload_history(cfg.kind, &cfg.json_path).await;
        }

        if result.detected {
            error!(
                kind = cfg.kind.as_str(),
                status = %result.status_text,
                "check FAILED: detection reported"
            );
        } else {
            info!(
                kind = cfg.kind.as_str(),
                status = %result.status_text,
                file_name = result.file_name.as_deref().unwrap_or(""),
                "check passed"
            );
        }
    }
}

fn append_result(cfg: &CheckConfig, source: &SampleSource, result: &CheckResult) -> anyhow::Result<()> {
    match cfg.kind {
        CheckKind::Antivirus => {
            let entry = AntivirusEntry {
                timestamp: Utc::now(),
                file_name: result.file_name.clone().unwrap_or_default(),
                status_text: result.status_text.clone(),
                is_virus_detected: result.detected,
                file_exists: result.file_exists,
                file_path: result.file_path.clone().unwrap_or_default(),
                ip: String::new(),
                file_content: String::new(),
            };
            history::append_entry(&cfg.json_path, entry)
        }
        CheckKind::Dlp => {
            let sample_name = match source {
                SampleSource::LocalFile(path) => Path::new(path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string(),
                SampleSource::Download => result.file_name.clone().unwrap_or_default(),
            };
            let entry = DlpEntry {
                timestamp: Utc::now(),
                status_text: result.status_text.clone(),
                is_dlp_active: result.detected,
                category: category_for(&sample_name).to_string(),
                file_name: sample_name,
                ip: String::new(),
                file_content: String::new(),
            };
            history::append_entry(&cfg.json_path, entry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::VerifyMode;
    use crate::history::History;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use reqwest::Method;
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn scan_router() -> Router {
        Router::new()
            .route("/scan", post(|| async { Json(json!({"file_name": "kept.txt"})) }))
            .route("/check", get(|| async { Json(json!({"exists": true})) }))
    }

    fn config(base: &str, json_path: PathBuf, sample: PathBuf, verify: VerifyMode) -> CheckConfig {
        CheckConfig {
            kind: CheckKind::Antivirus,
            sources: vec![SampleSource::LocalFile(sample)],
            target: CheckTarget {
                url: format!("{base}/scan"),
                method: Method::POST,
                verify,
            },
            json_path,
            interval: Duration::from_secs(600),
            verify_delay: Duration::from_millis(0),
            uploads_dir: PathBuf::from("uploads"),
        }
    }

    #[tokio::test]
    async fn two_cycles_against_a_full_history_evict_the_oldest() {
        let tmp = tempfile::tempdir().unwrap();
        let sample = tmp.path().join("sample.txt");
        std::fs::write(&sample, "payload").unwrap();
        let json_path = tmp.path().join("antivirus_results.json");

        let seeded = History {
            results: (0..15)
                .map(|i| AntivirusEntry {
                    timestamp: Utc::now(),
                    file_name: format!("old_{i}.txt"),
                    status_text: "Request succeeded: 200 OK".to_string(),
                    is_virus_detected: false,
                    file_exists: false,
                    file_path: String::new(),
                    ip: String::new(),
                    file_content: String::new(),
                })
                .collect::<Vec<_>>(),
        };
        std::fs::write(&json_path, serde_json::to_vec_pretty(&seeded).unwrap()).unwrap();

        let base = serve(scan_router()).await;
        let cfg = config(&base, json_path.clone(), sample, VerifyMode::None);
        let checker = Checker::new(cfg.kind, cfg.verify_delay, cfg.uploads_dir.clone());
        let detected = AtomicBool::new(false);

        run_cycle_once(&checker, &cfg, None, &detected).await;
        run_cycle_once(&checker, &cfg, None, &detected).await;

        let history: History<AntivirusEntry> = crate::history::load(&json_path);
        assert_eq!(history.results.len(), 15);
        assert_eq!(history.results[0].file_name, "old_2.txt");
        assert_eq!(history.results[13].file_name, "kept.txt");
        assert_eq!(history.results[14].file_name, "kept.txt");
        assert!(!detected.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn shutdown_during_the_verify_delay_still_writes_the_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let sample = tmp.path().join("sample.txt");
        std::fs::write(&sample, "payload").unwrap();
        let json_path = tmp.path().join("antivirus_results.json");

        let base = serve(scan_router()).await;
        let mut cfg = config(
            &base,
            json_path.clone(),
            sample,
            VerifyMode::RemoteUrl(format!("{base}/check")),
        );
        cfg.verify_delay = Duration::from_millis(300);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let detected = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_check_loop(
            cfg,
            None,
            shutdown_rx,
            detected.clone(),
        ));

        // Let the first cycle reach its verification sleep, then signal.
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let history: History<AntivirusEntry> = crate::history::load(&json_path);
        assert_eq!(history.results.len(), 1, "in-flight cycle must complete");
        assert!(history.results[0].file_exists);
        assert!(history.results[0].status_text.contains("File exists"));
    }

    #[tokio::test]
    async fn dlp_entries_carry_sample_name_and_category() {
        let tmp = tempfile::tempdir().unwrap();
        let sample = tmp.path().join("test_credit_card.txt");
        std::fs::write(&sample, "4532-1234-5678-9010").unwrap();
        let json_path = tmp.path().join("dlp_results.json");

        let base = serve(scan_router()).await;
        let cfg = CheckConfig {
            kind: CheckKind::Dlp,
            sources: vec![SampleSource::LocalFile(sample)],
            target: CheckTarget {
                url: format!("{base}/scan"),
                method: Method::POST,
                verify: VerifyMode::None,
            },
            json_path: json_path.clone(),
            interval: Duration::from_secs(600),
            verify_delay: Duration::from_millis(0),
            uploads_dir: PathBuf::from("uploads"),
        };
        let checker = Checker::new(cfg.kind, cfg.verify_delay, cfg.uploads_dir.clone());
        let detected = AtomicBool::new(false);

        run_cycle_once(&checker, &cfg, None, &detected).await;

        let history: History<DlpEntry> = crate::history::load(&json_path);
        assert_eq!(history.results.len(), 1);
        assert_eq!(history.results[0].file_name, "test_credit_card.txt");
        assert_eq!(history.results[0].category, "credit_card");
        assert!(!history.results[0].is_dlp_active);
    }
}
