use crate::config::{MAX_HOSTNAME_LEN, RESOLVE_DNS_TIMEOUT_MS};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, Ipv4Addr};
use std::{sync::Arc, time::Duration};
use tracing::debug;

pub type DnsResolver = Arc<TokioAsyncResolver>;

pub fn new_resolver() -> DnsResolver {
    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_millis(RESOLVE_DNS_TIMEOUT_MS);
    debug!("DNS resolver options: {:?}", opts);
    let dns_resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

    Arc::new(dns_resolver)
}

/// First IPv4 address of `host`, `None` when it does not resolve.
pub async fn resolve_ipv4(dns_resolver: &DnsResolver, host: &str) -> Option<Ipv4Addr> {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return None;
    }

    match dns_resolver.lookup_ip(host).await {
        Ok(lookup_ip) => lookup_ip.iter().find_map(|ip| match ip {
            IpAddr::V4(ipv4) => Some(ipv4),
            IpAddr::V6(_) => None,
        }),
        Err(err) => {
            debug!("{}: {}", host, err);
            None
        }
    }
}
