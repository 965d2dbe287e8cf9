use crate::model::{now_scan_time, ScanRecord};
use crate::probe::HostProber;
use futures::{stream, StreamExt};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Probes every host with at most `concurrency` probes in flight and keeps
/// the ones that answered on at least one port. Every probed host, live or
/// not, is also sent to `sink` as soon as it is known. Dead hosts go there
/// with no live port.
#[instrument(name = "collect", level = "info", fields(domain = domain), skip_all)]
pub async fn collect<P>(
    prober: &P,
    domain: &str,
    hosts: impl IntoIterator<Item = String>,
    concurrency: usize,
    sink: Option<mpsc::Sender<ScanRecord>>,
) -> Vec<ScanRecord>
where
    P: HostProber + ?Sized,
{
    let hosts: HashSet<String> = hosts.into_iter().collect();
    info!("{} hosts to probe", hosts.len());

    let records: Vec<ScanRecord> = stream::iter(hosts)
        .map(|host| async move { prober.probe(&host).await })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|probe| {
            let sink = sink.clone();
            async move {
                let record = ScanRecord {
                    domain: domain.to_string(),
                    subdomain: probe.host.clone(),
                    live_ports: probe.live_ports(),
                    ip_address: probe.ip,
                    scan_time: now_scan_time(),
                    image_http: None,
                    image_https: None,
                };

                if let Some(sink) = sink {
                    if let Err(err) = sink.send(record.clone()).await {
                        warn!("{} not written: {}", record.subdomain, err);
                    }
                }

                if probe.is_live() {
                    Some(record)
                } else {
                    debug!("Dropped {}: no live port", probe.host);
                    None
                }
            }
        })
        .collect()
        .await;

    info!("{} live hosts", records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LivePort;
    use crate::probe::HostProbe;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hosts starting with `dead` never answer, `half` answers on 443 only.
    /// Tracks the highest number of probes running at once.
    struct FakeProber {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeProber {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HostProber for FakeProber {
        async fn probe(&self, host: &str) -> HostProbe {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let (http, https) = if host.starts_with("dead") {
                (None, None)
            } else if host.starts_with("half") {
                (None, Some(403))
            } else {
                (Some(200), Some(200))
            };
            HostProbe {
                host: host.to_string(),
                http,
                https,
                ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
            }
        }
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn keeps_only_live_hosts() {
        let prober = FakeProber::new();
        let mut records = collect(
            &prober,
            "example.com",
            hosts(&[
                "www.example.com",
                "dead.example.com",
                "half.example.com",
                "www.example.com",
            ]),
            2,
            None,
        )
        .await;
        records.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));

        // duplicates are probed once
        assert_eq!(3, prober.calls.load(Ordering::SeqCst));
        assert_eq!(2, records.len());
        assert_eq!("half.example.com", records[0].subdomain);
        assert_eq!(vec![LivePort { port: 443, status: 403 }], records[0].live_ports);
        assert_eq!("www.example.com", records[1].subdomain);
        assert_eq!(vec![200, 200], records[1].http_codes());
        assert!(records
            .iter()
            .all(|record| record.ports().len() == record.http_codes().len()));
    }

    #[tokio::test]
    async fn streams_every_probed_host_to_the_sink() {
        let prober = FakeProber::new();
        let (tx, mut rx) = mpsc::channel(8);
        let records = collect(
            &prober,
            "example.com",
            hosts(&["a.example.com", "dead.example.com"]),
            4,
            Some(tx),
        )
        .await;

        assert_eq!(1, records.len());
        let mut streamed = Vec::new();
        while let Some(record) = rx.recv().await {
            streamed.push(record);
        }
        streamed.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));

        assert_eq!(2, streamed.len());
        assert_eq!(records[0], streamed[0]);
        assert_eq!("dead.example.com", streamed[1].subdomain);
        assert!(streamed[1].live_ports.is_empty());
    }

    #[tokio::test]
    async fn closed_sink_keeps_the_records() {
        let prober = FakeProber::new();
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let records = collect(
            &prober,
            "example.com",
            hosts(&["a.example.com", "b.example.com"]),
            2,
            Some(tx),
        )
        .await;
        assert_eq!(2, records.len());
    }

    #[tokio::test]
    async fn probes_never_exceed_the_bound() {
        let prober = FakeProber::new();
        let names: Vec<String> = (0..20).map(|i| format!("h{}.example.com", i)).collect();
        let records = collect(&prober, "example.com", names, 3, None).await;

        assert_eq!(20, records.len());
        assert_eq!(20, prober.calls.load(Ordering::SeqCst));
        let peak = prober.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "{} probes ran at once", peak);
        assert!(peak > 1);
    }
}
