mod capture;
mod collect;
mod config;
mod diff;
mod dns;
mod error;
mod flatfile;
mod model;
mod modules;
mod probe;
mod process;
mod report;
mod scan;
mod store;
mod subdomains;
mod utils;

pub use error::{Error, Result};

use crate::config::{Config, DEFAULT_DB_PATH, DEFAULT_OUTPUT_DIR};
use crate::diff::ScanHistory;
use crate::model::ScanRecord;
use crate::report::ReportFormat;
use crate::store::{ScanStore, SqliteStore};
use crate::utils::log::init_tracing_subscriber;
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use scan::{persist, scan};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

fn main() -> Result<()> {
    let cli = Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .subcommand(Command::new("tools").about("List the subdomain enumerators"))
        .subcommand(
            Command::new("scan")
                .about("Enumerate, probe and capture the subdomains of some domains")
                .arg(
                    Arg::new("domain")
                        .short('d')
                        .long("domain")
                        .help("A domain to scan, can be repeated")
                        .value_name("DOMAIN")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .help("File with one domain per line")
                        .value_name("FILE"),
                )
                .arg(
                    Arg::new("dir")
                        .short('D')
                        .long("dir")
                        .help("Directory of domain files, read recursively")
                        .value_name("DIR"),
                )
                .group(
                    ArgGroup::new("targets")
                        .args(["domain", "file", "dir"])
                        .required(true)
                        .multiple(true),
                )
                .arg(
                    Arg::new("tools")
                        .long("tools")
                        .help("Enumerators to run")
                        .value_name("TOOLS")
                        .num_args(1..)
                        .value_delimiter(','),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .help("Hosts probed at the same time")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("no-capture")
                        .long("no-capture")
                        .action(ArgAction::SetTrue)
                        .help("Skip the screenshots"),
                )
                .arg(
                    Arg::new("minimal")
                        .long("minimal")
                        .action(ArgAction::SetTrue)
                        .help("Minimal report from the results file, nothing stored"),
                )
                .arg(
                    Arg::new("logs")
                        .short('s')
                        .long("logs")
                        .action(ArgAction::SetTrue)
                        .help("Save logs into a .log file"),
                )
                .arg(db_arg())
                .arg(output_arg()),
        )
        .subcommand(
            Command::new("report")
                .about("Compare every stored scan with the one before it")
                .arg(db_arg())
                .arg(output_arg())
                .arg(file_name_arg())
                .arg(
                    Arg::new("format")
                        .long("format")
                        .help("Report format")
                        .value_name("FORMAT")
                        .value_parser(["html", "json", "both"])
                        .default_value("html"),
                ),
        )
        .subcommand(
            Command::new("report-file")
                .about("Minimal report of a results file")
                .arg(
                    Arg::new("input")
                        .help("The results file")
                        .value_name("RESULTS")
                        .required(true)
                        .index(1),
                )
                .arg(output_arg())
                .arg(file_name_arg()),
        )
        .arg_required_else_help(true)
        .get_matches();

    match cli.subcommand() {
        Some(("tools", _)) => modules::display_all(),
        Some(("scan", args)) => run_scan(args)?,
        Some(("report", args)) => {
            init_tracing_subscriber(false, Path::new("."), "report")?;
            run_report(args)?;
        }
        Some(("report-file", args)) => {
            init_tracing_subscriber(false, Path::new("."), "report")?;
            run_report_file(args)?;
        }

        // fallback if a cmd is not handled (should not possible)
        _ => {
            error!("{:12} - Command not handled, exit program", "CLI ERROR");
            return Err(Error::CliUsage("Command not handled".into()));
        }
    }

    Ok(())
}

// region:        --- Commands

fn run_scan(args: &ArgMatches) -> Result<()> {
    let config = Config::from_matches(args)?;

    let paths = scan::prepare_output(&config.output_dir)?;
    init_tracing_subscriber(config.save_logs, &config.output_dir, &paths.stamp)?;

    let domains = read_targets(args)?;
    if domains.is_empty() {
        return Err(Error::CliUsage("No domain to scan".into()));
    }

    // run the pipeline
    info!("Scanning {} domains (run_{})", domains.len(), paths.stamp);
    let records = scan(&config, domains, &paths)?;
    info!("{} live subdomains", records.len());

    if config.minimal {
        let records = read_results(&paths.results)?;
        report::write_minimal_report(&config.output_dir, None, &records)?;
        return Ok(());
    }

    let store = match SqliteStore::open_or_create(&config.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!("Opening {}: {}", config.db_path.display(), err);
            return Ok(());
        }
    };

    if let Some(scan_id) = persist(&store, &records) {
        info!("Stored as scan {}", scan_id);
    }
    write_history_report(&store, &config.output_dir, None, ReportFormat::Html)
}

fn run_report(args: &ArgMatches) -> Result<()> {
    let db_path = path_arg(args, "db", DEFAULT_DB_PATH);
    let store = SqliteStore::open_or_create(&db_path)?;
    let format = match args.get_one::<String>("format") {
        Some(format) => ReportFormat::parse(format)?,
        None => ReportFormat::Html,
    };

    write_history_report(
        &store,
        &path_arg(args, "output", DEFAULT_OUTPUT_DIR),
        args.get_one::<String>("file").map(String::as_str),
        format,
    )
}

fn run_report_file(args: &ArgMatches) -> Result<()> {
    let input = args
        .get_one::<String>("input")
        .ok_or_else(|| Error::CliUsage("Missing results file".into()))?;
    let records = read_results(Path::new(input))?;
    if records.is_empty() {
        warn!("{} has no record", input);
    }

    report::write_minimal_report(
        &path_arg(args, "output", DEFAULT_OUTPUT_DIR),
        args.get_one::<String>("file").map(String::as_str),
        &records,
    )?;
    Ok(())
}

// endregion:     --- Commands

// region:        --- Helpers

fn write_history_report(
    store: &dyn ScanStore,
    output_dir: &Path,
    file_name: Option<&str>,
    format: ReportFormat,
) -> Result<()> {
    let history = ScanHistory::from_records(store.select_all()?);
    if history.is_empty() {
        warn!("No stored scan, no report written");
        return Ok(());
    }

    report::write_report(output_dir, file_name, None, format, &history.diff())?;
    Ok(())
}

fn read_targets(args: &ArgMatches) -> Result<Vec<String>> {
    let mut content = String::new();
    if let Some(domains) = args.get_many::<String>("domain") {
        for domain in domains {
            content.push_str(domain);
            content.push('\n');
        }
    }

    let mut domains = scan::parse_domains(&content);
    if let Some(file) = args.get_one::<String>("file") {
        domains.extend(scan::read_domains_file(Path::new(file))?);
    }
    if let Some(dir) = args.get_one::<String>("dir") {
        domains.extend(scan::read_domains_dir(Path::new(dir))?);
    }

    // same domain from several sources
    Ok(scan::parse_domains(&domains.join("\n")))
}

#[tokio::main]
async fn read_results(path: &Path) -> Result<Vec<ScanRecord>> {
    flatfile::read_records(path).await
}

fn path_arg(args: &ArgMatches, id: &str, default: &str) -> PathBuf {
    PathBuf::from(
        args.get_one::<String>(id)
            .map(String::as_str)
            .unwrap_or(default),
    )
}

fn db_arg() -> Arg {
    Arg::new("db")
        .long("db")
        .help("SQLite database of past scans")
        .value_name("DB")
        .env("SUBRECON_DB")
        .default_value(DEFAULT_DB_PATH)
}

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .help("Output directory")
        .value_name("DIR")
        .default_value(DEFAULT_OUTPUT_DIR)
}

fn file_name_arg() -> Arg {
    Arg::new("file")
        .short('f')
        .long("file")
        .help("Report file name, extension is added")
        .value_name("NAME")
}

// endregion:     --- Helpers
