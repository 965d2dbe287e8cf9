use crate::modules::subdomains::SubdomainModule;
use crate::process::run_tool;
use futures::{stream, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, instrument, trace};

/// Marker some tools (amass) print between a source name and the host it
/// led to, e.g. `cname.example.net --> www.example.com`.
const CONNECTOR: &str = " --> ";

/// Cleans one line of tool output and keeps it only when it is `domain`
/// itself or a child of it on a label boundary.
pub fn normalize(line: &str, domain: &str) -> Option<String> {
    let candidate = match line.rfind(CONNECTOR) {
        Some(idx) => &line[idx + CONNECTOR.len()..],
        None => line,
    };
    let candidate = candidate.trim();

    let is_child = candidate
        .strip_suffix(domain)
        .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1);

    if candidate == domain || is_child {
        Some(candidate.to_string())
    } else {
        debug!("Filtered: {:?} is not part of {}", candidate, domain);
        None
    }
}

/// Runs every tool concurrently for `domain`. A tool that fails yields no
/// lines instead of failing the others.
#[instrument(name = "enumerators", level = "info", fields(domain = domain), skip_all)]
pub async fn run_enumerators(
    domain: &str,
    modules: &[Box<dyn SubdomainModule>],
) -> HashMap<String, Vec<String>> {
    stream::iter(modules.iter())
        .map(|module| async move {
            let name = module.name();
            info!("Launching {}", name);
            let lines = match run_tool(&module.program(), &module.args(domain)).await {
                Ok(lines) => lines,
                Err(err) => {
                    error!("{}: {}", name, err);
                    Vec::new()
                }
            };
            info!("{} returned {} lines", name, lines.len());
            (name, lines)
        })
        .buffer_unordered(modules.len().max(1))
        .collect()
        .await
}

#[instrument(name = "subdomains", level = "info", fields(domain = domain), skip_all)]
pub async fn collect_subdomains(
    domain: &str,
    modules: &[Box<dyn SubdomainModule>],
) -> HashSet<String> {
    let subdomains: HashSet<String> = run_enumerators(domain, modules)
        .await
        .into_values()
        .flatten()
        .filter_map(|line| normalize(&line, domain))
        .inspect(|subdomain| trace!("Collecting: {:?}", subdomain))
        .collect();

    info!("{} unique subdomains", subdomains.len());
    subdomains
}
