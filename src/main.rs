use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tiffpool::{ConverterConfig, ConverterService};

fn load_config(explicit: Option<&Path>) -> Result<ConverterConfig> {
    if let Some(path) = explicit {
        return ConverterConfig::from_toml_file(path).with_context(|| format!("loading config {}", path.display()));
    }

    // Look for tiffpool.toml in app support, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("tiffpool");
        d.push("tiffpool.toml");
        tried.push(d);
    }
    tried.push(PathBuf::from("tiffpool.toml"));

    for p in &tried {
        if p.exists() {
            log::info!("using configuration {}", p.display());
            return ConverterConfig::from_toml_file(p).with_context(|| format!("loading config {}", p.display()));
        }
    }

    Ok(ConverterConfig::default())
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the pool and read commands from stdin
    Run {
        /// Paths to ingest right after startup
        paths: Vec<PathBuf>,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Parser, Debug)]
#[command(version, about = "Converts detector TIFF frames as they land on disk.")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override the number of workers
    #[arg(long, short, global = true)]
    workers: Option<usize>,

    /// Log debug details
    #[arg(long, short, default_value_t = false, global = true)]
    verbose: bool,
}

/// One line typed by the operator
#[derive(Debug, PartialEq)]
enum Request {
    Add(PathBuf),
    Batch(Vec<PathBuf>),
    Folder(PathBuf),
    Reset,
    Stats,
    Quit,
}

fn parse_request(line: &str) -> Result<Option<Request>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let request = match word {
        "add" if !rest.is_empty() => Request::Add(PathBuf::from(rest)),
        "batch" if !rest.is_empty() => Request::Batch(rest.split_whitespace().map(PathBuf::from).collect()),
        "folder" if !rest.is_empty() => Request::Folder(PathBuf::from(rest)),
        "add" | "batch" | "folder" => return Err(anyhow!("'{}' needs at least one path", word)),
        "reset" => Request::Reset,
        "stats" => Request::Stats,
        "quit" | "exit" => Request::Quit,
        _ => Request::Add(PathBuf::from(line)),
    };
    Ok(Some(request))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
        config.validate().context("applying --workers")?;
    }

    match args.cmd {
        Command::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Run { paths } => run(config, paths),
    }
}

fn run(config: ConverterConfig, paths: Vec<PathBuf>) -> Result<()> {
    let mut service = ConverterService::start(config).context("starting conversion pool")?;
    if !paths.is_empty() {
        service.ingest_batch(paths);
    }

    let served = serve(&service, io::stdin().lock(), io::stdout().lock());

    // The pool is always stopped, even if reading commands failed
    service.shutdown().context("stopping conversion pool")?;
    served?;

    let report = service.report();
    println!(
        "\nConverted {} frame(s) in {:.3}s (avg {:.3}s)",
        report.frames, report.seconds, report.average_seconds_per_frame
    );
    Ok(())
}

fn serve(service: &ConverterService, input: impl BufRead, mut out: impl Write) -> Result<()> {
    for line in input.lines() {
        let line = line.context("reading stdin")?;
        let request = match parse_request(&line) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "error: {}", e)?;
                continue;
            }
        };
        match request {
            Request::Add(path) => service.ingest(path),
            Request::Batch(paths) => service.ingest_batch(paths),
            Request::Folder(dir) => {
                if let Err(e) = service.ingest_folder(&dir) {
                    writeln!(out, "error: {}", e)?;
                }
            }
            Request::Reset => service.reset_stats(),
            Request::Stats => {
                let report = serde_json::to_string(&service.report()).context("serializing report")?;
                writeln!(out, "{}", report)?;
            }
            Request::Quit => break,
        }
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requests() {
        assert_eq!(parse_request("  ").unwrap(), None);
        assert_eq!(parse_request("# comment").unwrap(), None);
        assert_eq!(parse_request("add /data/raw/a.tif").unwrap(), Some(Request::Add("/data/raw/a.tif".into())));
        assert_eq!(parse_request("/data/raw/b.tif").unwrap(), Some(Request::Add("/data/raw/b.tif".into())));
        assert_eq!(
            parse_request("batch a.tif b.tif").unwrap(),
            Some(Request::Batch(vec!["a.tif".into(), "b.tif".into()]))
        );
        assert_eq!(parse_request("folder /data/raw").unwrap(), Some(Request::Folder("/data/raw".into())));
        assert_eq!(parse_request("reset").unwrap(), Some(Request::Reset));
        assert_eq!(parse_request("stats").unwrap(), Some(Request::Stats));
        assert_eq!(parse_request("quit").unwrap(), Some(Request::Quit));
        assert!(parse_request("batch").is_err());
    }

    #[test]
    fn explicit_config_must_exist() {
        assert!(load_config(Some(Path::new("/surely/not/here/tiffpool.toml"))).is_err());
    }

    #[test]
    fn serve_answers_stats_and_stops_on_quit() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig::default().with_worker_count(1).with_poll_delay(0.01).with_shutdown_poll(0.01);
        let mut service = ConverterService::start(config).unwrap();

        let missing = dir.path().join("nope");
        let input = format!("folder {}\nstats\nquit\nstats\n", missing.display());
        let mut out = Vec::new();
        serve(&service, input.as_bytes(), &mut out).unwrap();
        service.shutdown().unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("error: Not a directory"));
        let report: tiffpool::ServiceReport = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(report.frames, 0);
        assert_eq!(report.worker_count, 1);
    }
}
