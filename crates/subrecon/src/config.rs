use crate::capture::CapturePolicy;
use crate::{Error, Result};
use clap::ArgMatches;
use std::path::PathBuf;
use std::time::Duration;

// region:        --- Constants

// timeouts
pub const HTTP_PROBE_TIMEOUT_MS: u64 = 4000;
pub const RESOLVE_DNS_TIMEOUT_MS: u64 = 4000;

// concurrency numbers
pub const DOMAINS_CONCURRENCY: usize = 4;
pub const PROBE_CONCURRENCY: usize = 50;
pub const CAPTURE_CONCURRENCY: usize = 4;

// capture retry
pub const CAPTURE_ATTEMPTS: usize = 2;
pub const CAPTURE_RETRY_DELAY_MS: u64 = 3000;

// hostnames longer than this are never probed
pub const MAX_HOSTNAME_LEN: usize = 253;

pub const DEFAULT_DB_PATH: &str = "scans.db";
pub const DEFAULT_OUTPUT_DIR: &str = "output/subrecon";
pub const DEFAULT_TOOLS: &[&str] = &["findomain", "assetfinder", "subfinder"];

// endregion:     --- Constants

#[derive(Debug, Clone)]
pub struct Config {
    pub tools: Vec<String>,
    pub http_timeout: Duration,
    pub domains_concurrency: usize,
    pub probe_concurrency: usize,
    pub capture_concurrency: usize,
    pub capture: bool,
    pub capture_policy: CapturePolicy,
    pub minimal: bool,
    pub save_logs: bool,
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: DEFAULT_TOOLS.iter().map(|tool| tool.to_string()).collect(),
            http_timeout: Duration::from_millis(HTTP_PROBE_TIMEOUT_MS),
            domains_concurrency: DOMAINS_CONCURRENCY,
            probe_concurrency: PROBE_CONCURRENCY,
            capture_concurrency: CAPTURE_CONCURRENCY,
            capture: true,
            capture_policy: CapturePolicy::default(),
            minimal: false,
            save_logs: false,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Config {
    /// Builds the run configuration from the `scan` subcommand arguments,
    /// falling back to the defaults above for anything not given.
    pub fn from_matches(args: &ArgMatches) -> Result<Self> {
        let mut config = Config::default();

        if let Some(tools) = args.get_many::<String>("tools") {
            config.tools = tools.cloned().collect();
        }
        if let Some(concurrency) = args.get_one::<usize>("concurrency") {
            if *concurrency == 0 {
                return Err(Error::CliUsage("--concurrency must be at least 1".into()));
            }
            config.probe_concurrency = *concurrency;
        }
        if let Some(db) = args.get_one::<String>("db") {
            config.db_path = PathBuf::from(db);
        }
        if let Some(output) = args.get_one::<String>("output") {
            config.output_dir = PathBuf::from(output);
        }

        config.capture = !args.get_flag("no-capture");
        config.minimal = args.get_flag("minimal");
        config.save_logs = args.get_flag("logs");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, ArgAction, Command};

    fn scan_command() -> Command {
        Command::new("scan")
            .arg(Arg::new("tools").long("tools").num_args(1..).value_delimiter(','))
            .arg(
                Arg::new("concurrency")
                    .long("concurrency")
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(Arg::new("db").long("db"))
            .arg(Arg::new("output").short('o').long("output"))
            .arg(Arg::new("no-capture").long("no-capture").action(ArgAction::SetTrue))
            .arg(Arg::new("minimal").long("minimal").action(ArgAction::SetTrue))
            .arg(Arg::new("logs").short('s').long("logs").action(ArgAction::SetTrue))
    }

    #[test]
    fn defaults_without_arguments() {
        let args = scan_command().get_matches_from(["scan"]);
        let config = Config::from_matches(&args).unwrap();
        assert_eq!(Duration::from_millis(HTTP_PROBE_TIMEOUT_MS), config.http_timeout);
        assert_eq!(vec!["findomain", "assetfinder", "subfinder"], config.tools);
        assert_eq!(true, config.capture);
        assert_eq!(PathBuf::from(DEFAULT_DB_PATH), config.db_path);
    }

    #[test]
    fn reads_the_scan_arguments() {
        let args = scan_command().get_matches_from([
            "scan",
            "--tools",
            "amass,subfinder",
            "--concurrency",
            "8",
            "--no-capture",
            "--db",
            "history.db",
        ]);
        let config = Config::from_matches(&args).unwrap();
        assert_eq!(vec!["amass", "subfinder"], config.tools);
        assert_eq!(8, config.probe_concurrency);
        assert_eq!(false, config.capture);
        assert_eq!(PathBuf::from("history.db"), config.db_path);
    }

    #[test]
    fn zero_concurrency_is_a_usage_error() {
        let args = scan_command().get_matches_from(["scan", "--concurrency", "0"]);
        assert!(matches!(Config::from_matches(&args), Err(Error::CliUsage(_))));
    }
}
