use crate::capture::{capture_all, Aquatone};
use crate::collect::collect;
use crate::config::Config;
use crate::flatfile::{self, ResultsWriter};
use crate::model::{ScanId, ScanRecord};
use crate::probe::{new_http_client, LivenessProber};
use crate::store::ScanStore;
use crate::subdomains::collect_subdomains;
use crate::utils::ensure_dir;
use crate::{dns, modules, Result};
use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, trace, warn};

// records waiting for the results file
const RESULTS_CHANNEL_CAPACITY: usize = 256;

// region:        --- Run files

/// Files produced by one run, named after its start time.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub stamp: String,
    pub results: PathBuf,
    /// Probed hosts that answered on no port.
    pub invalid: PathBuf,
    pub captures: PathBuf,
}

impl RunPaths {
    pub fn new(output_dir: &Path) -> Result<Self> {
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]"))?;
        Ok(Self {
            results: output_dir.join(format!("Scan_{}_results.txt", stamp)),
            invalid: output_dir.join(format!("invalid_Scan_{}_results.txt", stamp)),
            captures: output_dir.join("captures").join(&stamp),
            stamp,
        })
    }
}

// endregion:     --- Run files

// region:        --- Scan main function

#[tokio::main]
#[instrument(name = "scan", level = "info", skip_all)]
pub async fn scan(
    config: &Config,
    domains: Vec<String>,
    paths: &RunPaths,
) -> Result<Vec<ScanRecord>> {
    trace!("Start scan on {} domains", domains.len());

    // fail fast on unknown tools
    let modules = modules::select(&config.tools)?;

    // create http client and resolver
    let http_client = new_http_client(config.http_timeout)?;
    let prober = LivenessProber::new(http_client, dns::new_resolver());

    // stream probed hosts to the results files
    let (tx, writer_task) = spawn_results_writer(paths).await?;

    // scan core logic
    let records: Vec<ScanRecord> = stream::iter(domains)
        .map(|domain| {
            let (prober, modules, tx) = (&prober, &modules, tx.clone());
            async move {
                let subdomains = collect_subdomains(&domain, modules).await;
                collect(prober, &domain, subdomains, config.probe_concurrency, Some(tx)).await
            }
        })
        .buffer_unordered(config.domains_concurrency.max(1))
        .flat_map(stream::iter)
        .collect()
        .await;

    drop(tx);
    match writer_task.await {
        Ok((live, dead)) => info!("{} live and {} dead hosts written", live, dead),
        Err(err) => error!("Results writer stopped: {}", err),
    }

    if !config.capture {
        return Ok(records);
    }

    let records = capture_all(
        &Aquatone::new(),
        records,
        &paths.captures,
        config.capture_policy,
        config.capture_concurrency,
    )
    .await;

    // results file again, now with the screenshots
    if let Err(err) = flatfile::write_records(&paths.results, &records).await {
        error!("Rewriting {}: {}", paths.results.display(), err);
    }

    Ok(records)
}

/// Live records go to the results file, dead ones to the invalid file.
/// The task returns how many lines each file received.
async fn spawn_results_writer(
    paths: &RunPaths,
) -> Result<(mpsc::Sender<ScanRecord>, JoinHandle<(usize, usize)>)> {
    let mut live_writer = ResultsWriter::open(&paths.results).await?;
    let mut dead_writer = ResultsWriter::open(&paths.invalid).await?;
    info!("Writing results to {}", live_writer.path().display());
    debug!("Writing dead hosts to {}", dead_writer.path().display());

    let (tx, rx) = mpsc::channel::<ScanRecord>(RESULTS_CHANNEL_CAPACITY);
    let writer_task = tokio::spawn(async move {
        let mut records = ReceiverStream::new(rx);
        let (mut live, mut dead) = (0usize, 0usize);
        while let Some(record) = records.next().await {
            let (writer, count) = if record.live_ports.is_empty() {
                (&mut dead_writer, &mut dead)
            } else {
                (&mut live_writer, &mut live)
            };
            match writer.append(&record).await {
                Ok(()) => *count += 1,
                Err(err) => error!("{}: {}", record.subdomain, err),
            }
        }
        for writer in [&mut live_writer, &mut dead_writer] {
            if let Err(err) = writer.flush().await {
                error!("Flushing {}: {}", writer.path().display(), err);
            }
        }
        (live, dead)
    });

    Ok((tx, writer_task))
}

// endregion:     --- Scan main function

/// Stores every record under one freshly allocated scan id. A failed insert
/// is logged and the remaining records are still stored.
#[instrument(name = "persist", level = "info", skip_all)]
pub fn persist(store: &dyn ScanStore, records: &[ScanRecord]) -> Option<ScanId> {
    if records.is_empty() {
        warn!("No live subdomain, nothing to store");
        return None;
    }

    let scan_id = match store.next_scan_id() {
        Ok(scan_id) => scan_id,
        Err(err) => {
            error!("Allocating scan id: {}", err);
            return None;
        }
    };

    let inserted = records
        .iter()
        .filter(|record| match store.insert(scan_id, record) {
            Ok(()) => true,
            Err(err) => {
                error!("Inserting {}: {}", record.subdomain, err);
                false
            }
        })
        .count();

    info!("Scan {}: {}/{} records stored", scan_id, inserted, records.len());
    Some(scan_id)
}

// region:        --- Domain inputs

/// One domain per line, blank lines and `#` comments ignored, duplicates dropped.
pub fn parse_domains(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(|line| line.trim().trim_end_matches('.').to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|domain| seen.insert(domain.clone()))
        .collect()
}

pub fn read_domains_file(path: &Path) -> Result<Vec<String>> {
    let domains = parse_domains(&fs::read_to_string(path)?);
    debug!("{} domains read from {}", domains.len(), path.display());
    Ok(domains)
}

/// Domains of every file under `dir`, recursively, in path order.
pub fn read_domains_dir(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    list_files(dir, &mut files)?;
    files.sort();

    let mut content = String::new();
    for file in &files {
        content.push_str(&fs::read_to_string(file)?);
        content.push('\n');
    }
    Ok(parse_domains(&content))
}

fn list_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            list_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

// endregion:     --- Domain inputs

pub fn prepare_output(output_dir: &Path) -> Result<RunPaths> {
    if ensure_dir(output_dir)? {
        debug!("Created {}", output_dir.display());
    }
    RunPaths::new(output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LivePort;
    use crate::store::{ScanIdAllocator, SqliteStore};
    use time::macros::datetime;

    fn record(subdomain: &str) -> ScanRecord {
        ScanRecord {
            domain: "example.com".to_string(),
            subdomain: subdomain.to_string(),
            live_ports: vec![LivePort { port: 80, status: 200 }],
            ip_address: None,
            scan_time: datetime!(2024-05-01 10:00:00),
            image_http: None,
            image_https: None,
        }
    }

    #[test]
    fn one_scan_id_per_run() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = persist(&store, &[record("a.example.com"), record("b.example.com")]);
        let second = persist(&store, &[record("a.example.com")]);
        assert_eq!(Some(1), first);
        assert_eq!(Some(2), second);

        let stored = store.select_all().unwrap();
        assert_eq!(3, stored.len());
        assert_eq!(2, stored.iter().filter(|stored| stored.scan_id == 1).count());
    }

    #[test]
    fn empty_run_stores_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(None, persist(&store, &[]));
        assert_eq!(1, store.next_scan_id().unwrap());
    }

    #[test]
    fn parses_domain_lists() {
        let content = "example.com\n\n# comment\n  Example.COM.\nother.org\n";
        assert_eq!(vec!["example.com", "other.org"], parse_domains(content));
    }

    #[test]
    fn reads_nested_domain_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a.com\nb.com\n").unwrap();
        std::fs::write(dir.path().join("nested/c.txt"), "c.com\na.com").unwrap();

        assert_eq!(
            vec!["a.com", "b.com", "c.com"],
            read_domains_dir(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn writer_splits_live_and_dead_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = prepare_output(dir.path()).unwrap();
        let (tx, writer_task) = spawn_results_writer(&paths).await.unwrap();

        let mut dead = record("dead.example.com");
        dead.live_ports.clear();
        tx.send(record("www.example.com")).await.unwrap();
        tx.send(dead.clone()).await.unwrap();
        drop(tx);

        assert_eq!((1, 1), writer_task.await.unwrap());
        let live = flatfile::read_records(&paths.results).await.unwrap();
        assert_eq!(vec![record("www.example.com")], live);
        let invalid = flatfile::read_records(&paths.invalid).await.unwrap();
        assert_eq!(vec![dead], invalid);
    }

    #[test]
    fn run_paths_share_one_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let paths = prepare_output(&dir.path().join("out")).unwrap();
        assert!(dir.path().join("out").is_dir());
        assert!(paths.results.to_string_lossy().contains(&paths.stamp));
        assert!(paths.invalid.to_string_lossy().contains(&paths.stamp));
        assert!(paths.captures.ends_with(&paths.stamp));
    }
}
