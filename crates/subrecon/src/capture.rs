use crate::config::{CAPTURE_ATTEMPTS, CAPTURE_RETRY_DELAY_MS};
use crate::model::{ScanRecord, HTTPS_PORT, HTTP_PORT};
use crate::process::run_with_stdin;
use crate::Result;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy)]
pub struct CapturePolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            attempts: CAPTURE_ATTEMPTS,
            delay: Duration::from_millis(CAPTURE_RETRY_DELAY_MS),
        }
    }
}

// region:        --- Screenshot tools

#[async_trait]
pub trait ScreenshotTool: Send + Sync {
    fn name(&self) -> String;

    /// Screenshots `host:port`, leaving PNG files under `out_dir/screenshots/`.
    async fn shoot(&self, host: &str, port: u16, out_dir: &Path) -> Result<()>;
}

pub struct Aquatone {}

impl Aquatone {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl ScreenshotTool for Aquatone {
    fn name(&self) -> String {
        "aquatone".to_string()
    }

    async fn shoot(&self, host: &str, port: u16, out_dir: &Path) -> Result<()> {
        let args = vec![
            "-ports".to_string(),
            port.to_string(),
            "-out".to_string(),
            out_dir.display().to_string(),
        ];
        run_with_stdin("aquatone", &args, host).await
    }
}

// endregion:     --- Screenshot tools

/// First PNG (by file name) in `out_dir/screenshots/`.
pub async fn find_screenshot(out_dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(out_dir.join("screenshots")).await.ok()?;
    let mut pngs = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
            pngs.push(path);
        }
    }
    pngs.sort();
    pngs.into_iter().next()
}

/// Empty `out_dir/screenshots/` so only this attempt's PNGs can be found.
async fn clear_screenshots(out_dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(out_dir.join("screenshots")).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err),
        _ => {}
    }
    fs::create_dir_all(out_dir).await
}

/// Screenshot of `host:port`, or `None` once every attempt came back empty.
#[instrument(name = "capture", level = "debug", fields(host = host, port = port), skip_all)]
pub async fn capture_port(
    tool: &dyn ScreenshotTool,
    host: &str,
    port: u16,
    out_dir: &Path,
    policy: CapturePolicy,
) -> Option<Vec<u8>> {
    for attempt in 1..=policy.attempts {
        if attempt > 1 {
            sleep(policy.delay).await;
        }

        if let Err(err) = clear_screenshots(out_dir).await {
            error!("Preparing {}: {}", out_dir.display(), err);
            continue;
        }

        if let Err(err) = tool.shoot(host, port, out_dir).await {
            warn!("{} attempt {}/{}: {}", tool.name(), attempt, policy.attempts, err);
            continue;
        }

        if let Some(path) = find_screenshot(out_dir).await {
            match fs::read(&path).await {
                Ok(image) => {
                    debug!("Captured {} on attempt {}", path.display(), attempt);
                    return Some(image);
                }
                Err(err) => error!("Reading {}: {}", path.display(), err),
            }
        } else {
            debug!("No screenshot after attempt {}/{}", attempt, policy.attempts);
        }
    }

    warn!("No screenshot for {}:{}", host, port);
    None
}

/// Fills both image fields. Only ports 80/443 that answered below 400 are captured.
pub async fn capture_record(
    tool: &dyn ScreenshotTool,
    mut record: ScanRecord,
    root: &Path,
    policy: CapturePolicy,
) -> ScanRecord {
    for live in record.live_ports.clone() {
        if !live.is_capturable() {
            continue;
        }

        let out_dir = root.join(format!("{}_{}", record.subdomain, live.port));
        let image = capture_port(tool, &record.subdomain, live.port, &out_dir, policy).await;
        match live.port {
            HTTP_PORT => record.image_http = image,
            HTTPS_PORT => record.image_https = image,
            _ => {}
        }
    }
    record
}

#[instrument(name = "captures", level = "info", skip_all)]
pub async fn capture_all(
    tool: &dyn ScreenshotTool,
    records: Vec<ScanRecord>,
    root: &Path,
    policy: CapturePolicy,
    concurrency: usize,
) -> Vec<ScanRecord> {
    info!("{} records to capture with {}", records.len(), tool.name());
    let records: Vec<ScanRecord> = stream::iter(records)
        .map(|record| capture_record(tool, record, root, policy))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let captured = records
        .iter()
        .filter(|record| record.image_http.is_some() || record.image_https.is_some())
        .count();
    info!("{} records with at least one screenshot", captured);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LivePort;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    /// Writes a screenshot starting at attempt `succeed_on`, fails before that.
    struct FakeTool {
        calls: AtomicUsize,
        succeed_on: usize,
        error_first: bool,
    }

    impl FakeTool {
        fn new(succeed_on: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                succeed_on,
                error_first: false,
            }
        }
    }

    #[async_trait]
    impl ScreenshotTool for FakeTool {
        fn name(&self) -> String {
            "fake".to_string()
        }

        async fn shoot(&self, host: &str, port: u16, out_dir: &Path) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.error_first && call == 1 {
                return Err(Error::ToolStatus {
                    tool: self.name(),
                    code: Some(1),
                });
            }
            if call >= self.succeed_on {
                let dir = out_dir.join("screenshots");
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join(format!("http__{}__{}.png", host, port)), PNG)?;
            }
            Ok(())
        }
    }

    fn policy() -> CapturePolicy {
        CapturePolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn second_attempt_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new(2);
        let image = capture_port(&tool, "www.example.com", 80, dir.path(), policy()).await;
        assert_eq!(Some(PNG.to_vec()), image);
        assert_eq!(2, tool.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn gives_up_after_two_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new(usize::MAX);
        let image = capture_port(&tool, "www.example.com", 443, dir.path(), policy()).await;
        assert_eq!(None, image);
        assert_eq!(2, tool.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn tool_error_counts_as_an_empty_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool {
            calls: AtomicUsize::new(0),
            succeed_on: 1,
            error_first: true,
        };
        let image = capture_port(&tool, "www.example.com", 80, dir.path(), policy()).await;
        assert_eq!(Some(PNG.to_vec()), image);
    }

    #[tokio::test]
    async fn error_status_ports_are_not_captured() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new(1);
        let record = ScanRecord {
            domain: "example.com".to_string(),
            subdomain: "www.example.com".to_string(),
            live_ports: vec![
                LivePort { port: 80, status: 301 },
                LivePort { port: 443, status: 503 },
            ],
            ip_address: None,
            scan_time: datetime!(2024-05-01 10:00:00),
            image_http: None,
            image_https: None,
        };

        let record = capture_record(&tool, record, dir.path(), policy()).await;
        assert_eq!(Some(PNG.to_vec()), record.image_http);
        assert_eq!(None, record.image_https);
        assert_eq!(1, tool.calls.load(Ordering::SeqCst));
        assert!(dir.path().join("www.example.com_80").is_dir());
    }

    /// Writes a screenshot on every call and records the peak of calls running at once.
    struct SlowTool {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ScreenshotTool for SlowTool {
        fn name(&self) -> String {
            "slow".to_string()
        }

        async fn shoot(&self, host: &str, port: u16, out_dir: &Path) -> Result<()> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let dir = out_dir.join("screenshots");
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(format!("{}_{}.png", host, port)), PNG)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn capture_all_respects_its_bound() {
        let dir = tempfile::tempdir().unwrap();
        let tool = SlowTool {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let records: Vec<ScanRecord> = (0..8)
            .map(|i| ScanRecord {
                domain: "example.com".to_string(),
                subdomain: format!("h{}.example.com", i),
                live_ports: vec![LivePort { port: 443, status: 200 }],
                ip_address: None,
                scan_time: datetime!(2024-05-01 10:00:00),
                image_http: None,
                image_https: None,
            })
            .collect();

        let records = capture_all(&tool, records, dir.path(), policy(), 2).await;
        assert_eq!(8, records.len());
        assert!(records.iter().all(|record| record.image_https.is_some()));
        let peak = tool.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "{} captures ran at once", peak);
        assert!(peak > 0);
    }

    #[tokio::test]
    async fn leftover_screenshots_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let shots = dir.path().join("screenshots");
        std::fs::create_dir_all(&shots).unwrap();
        std::fs::write(shots.join("old.png"), b"OLD-RUN").unwrap();

        let tool = FakeTool::new(usize::MAX);
        let image = capture_port(&tool, "www.example.com", 80, dir.path(), policy()).await;
        assert_eq!(None, image);
        assert!(!shots.join("old.png").exists());
    }

    #[tokio::test]
    async fn picks_the_first_png_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let shots = dir.path().join("screenshots");
        std::fs::create_dir_all(&shots).unwrap();
        std::fs::write(shots.join("b.png"), b"b").unwrap();
        std::fs::write(shots.join("a.png"), b"a").unwrap();
        std::fs::write(shots.join("0.txt"), b"0").unwrap();
        assert_eq!(Some(shots.join("a.png")), find_screenshot(dir.path()).await);
    }
}
