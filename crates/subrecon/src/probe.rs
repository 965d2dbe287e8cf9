use crate::config::MAX_HOSTNAME_LEN;
use crate::dns::{self, DnsResolver};
use crate::model::{LivePort, HTTPS_PORT, HTTP_PORT};
use crate::Result;
use async_trait::async_trait;
use reqwest::{redirect, Client};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, instrument, trace};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// region:        --- Probe result

/// What the three probes of one host returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProbe {
    pub host: String,
    pub http: Option<u16>,
    pub https: Option<u16>,
    pub ip: Option<Ipv4Addr>,
}

impl HostProbe {
    /// Answered probes only, port 80 before 443.
    pub fn live_ports(&self) -> Vec<LivePort> {
        [(HTTP_PORT, self.http), (HTTPS_PORT, self.https)]
            .into_iter()
            .filter_map(|(port, status)| status.map(|status| LivePort { port, status }))
            .collect()
    }

    pub fn is_live(&self) -> bool {
        self.http.is_some() || self.https.is_some()
    }
}

// endregion:     --- Probe result

#[async_trait]
pub trait HostProber: Send + Sync {
    async fn probe(&self, host: &str) -> HostProbe;
}

pub struct LivenessProber {
    http_client: Client,
    dns_resolver: DnsResolver,
}

impl LivenessProber {
    pub fn new(http_client: Client, dns_resolver: DnsResolver) -> Self {
        Self {
            http_client,
            dns_resolver,
        }
    }
}

#[async_trait]
impl HostProber for LivenessProber {
    #[instrument(name = "probe", level = "debug", fields(host = host), skip_all)]
    async fn probe(&self, host: &str) -> HostProbe {
        let (http, https, ip) = tokio::join!(
            http_status(&self.http_client, host, HTTP_PORT),
            http_status(&self.http_client, host, HTTPS_PORT),
            dns::resolve_ipv4(&self.dns_resolver, host),
        );
        trace!("http={:?} https={:?} ip={:?}", http, https, ip);

        HostProbe {
            host: host.to_string(),
            http,
            https,
            ip,
        }
    }
}

pub fn new_http_client(timeout: Duration) -> Result<Client> {
    let http_client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .redirect(redirect::Policy::limited(10))
        .build()?;
    debug!("HTTP Client created: {:?}", http_client);
    Ok(http_client)
}

/// Status of `GET http(s)://host`, `None` on any failure.
pub async fn http_status(http_client: &Client, host: &str, port: u16) -> Option<u16> {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return None;
    }

    let url = match port {
        HTTPS_PORT => format!("https://{}", host),
        _ => format!("http://{}", host),
    };

    match http_client.get(&url).send().await {
        Ok(res) => {
            debug!("{} answered {}", url, res.status());
            Some(res.status().as_u16())
        }
        Err(err) => {
            debug!("{}: {}", url, err);
            None
        }
    }
}
