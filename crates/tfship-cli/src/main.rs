use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tfship::auth;
use tfship::config::{self, ConfigInputs, PublishConfig, TfshipConfig};
use tfship::engine::{self, Reporter};
use tfship::events::EventLog;
use tfship::plan;
use tfship::receipt;
use tfship::registry::normalize_base_url;
use tfship::types::{EnsureOutcome, ItemState, PublishReport, RunState};

mod progress;

use progress::ProgressReporter;

/// Run reached `Done` but some checksum or platform upload failed.
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "tfship", version)]
#[command(about = "Publish Terraform provider releases to a TFE private registry")]
struct Cli {
    /// Config file (default: ./.tfship.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry host or base URL (default: app.terraform.io)
    #[arg(long, env = "TFE_HOST", global = true)]
    host: Option<String>,

    /// TFE organization; also the registry namespace
    #[arg(long = "org", env = "TFE_ORG", global = true)]
    organization: Option<String>,

    /// Provider name, e.g. okta
    #[arg(long, env = "PROVIDER_NAME", global = true)]
    provider: Option<String>,

    /// Identifier of the GPG key the checksums were signed with
    #[arg(long, env = "GPG_KEY_ID", global = true)]
    key_id: Option<String>,

    /// Directory holding the release artifacts (default: dist)
    #[arg(long, env = "TFE_DIST_DIR", global = true)]
    dist_dir: Option<PathBuf>,

    /// ASCII-armored public key (default: <dist-dir>/gpg-public-key.asc)
    #[arg(long, global = true)]
    gpg_key_file: Option<PathBuf>,

    /// Supported plugin protocol version (repeatable; default: 5.0)
    #[arg(long = "protocol", value_delimiter = ',', global = true)]
    protocols: Vec<String>,

    /// Request timeout (e.g. 30s, 2m); defaults to the HTTP client's
    #[arg(long, global = true)]
    timeout: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish a release: provider, key, version, checksums, platforms.
    Publish {
        /// Version to publish; a leading `v` is stripped
        version: String,

        /// Exit 0 even if some checksum or platform upload failed.
        #[arg(long)]
        allow_partial: bool,

        /// Write the JSON run report to this path.
        #[arg(long)]
        receipt: Option<PathBuf>,

        /// Append the run's events as JSONL to this path.
        #[arg(long)]
        events_file: Option<PathBuf>,

        /// Never draw a progress bar.
        #[arg(long)]
        no_progress: bool,
    },
    /// Print what a publish would register, without network access.
    Plan {
        /// Version to plan; a leading `v` is stripped
        version: String,
    },
    /// Print resolved configuration, token source and local file checks.
    Doctor {
        /// Also check the checksum files of this version
        version: Option<String>,
    },
}

struct CliReporter {
    progress: Option<ProgressReporter>,
    show_progress: bool,
}

impl CliReporter {
    fn new(show_progress: bool) -> Self {
        Self {
            progress: None,
            show_progress,
        }
    }

    fn line(&self, line: &str) {
        match &self.progress {
            Some(progress) => progress.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn finish(&mut self) {
        if let Some(progress) = self.progress.take() {
            progress.finish();
        }
    }
}

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        self.line(&format!("[info] {msg}"));
    }

    fn warn(&mut self, msg: &str) {
        self.line(&format!("[warn] {msg}"));
    }

    fn error(&mut self, msg: &str) {
        self.line(&format!("[error] {msg}"));
    }

    fn platform_started(&mut self, index: usize, total: usize, label: &str) {
        let show_progress = self.show_progress;
        let progress = self.progress.get_or_insert_with(|| {
            if show_progress {
                ProgressReporter::new(total)
            } else {
                ProgressReporter::silent(total)
            }
        });
        progress.set_item(index + 1, label);
    }

    fn platform_finished(&mut self, _state: &ItemState) {
        if let Some(progress) = self.progress.as_mut() {
            progress.finish_item();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[error] {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let file = load_file_config(cli.config.as_deref())?;

    match &cli.cmd {
        Commands::Publish {
            version,
            allow_partial,
            receipt: receipt_path,
            events_file,
            no_progress,
        } => {
            let mut reporter = CliReporter::new(!no_progress);
            let version = normalized_version(version, &mut reporter);
            let mut inputs = inputs_from_cli(&cli, &file)?;
            inputs.allow_partial = *allow_partial;
            inputs.token = resolve_token(inputs.host.as_deref(), &file).token;

            let cfg = config::resolve(&version, inputs, &file)?;
            let client = cfg.client()?;
            let mut events = EventLog::new();

            let result = engine::run_publish(&cfg, &client, &mut reporter, &mut events);
            reporter.finish();

            if let Some(path) = events_file {
                events.write_to_file(path)?;
            }
            let report = result?;
            if let Some(path) = receipt_path {
                receipt::write_report(path, &report)?;
            }

            print_report(&report);
            if report.state == RunState::Done {
                println!();
                println!("{}", client.provider_page_url(&report.release));
            }
            Ok(exit_code(&report, &cfg))
        }
        Commands::Plan { version } => {
            let mut reporter = CliReporter::new(false);
            let version = normalized_version(version, &mut reporter);
            let cfg = config::resolve(&version, inputs_from_cli(&cli, &file)?, &file)?;
            let planned = plan::build_plan(&cfg)?;

            print!("{}", planned.render());
            for artifact in planned.missing_binaries() {
                reporter.warn(&format!("binary not found: {}", artifact.filename));
            }
            match planned.preflight() {
                Ok(()) => Ok(ExitCode::SUCCESS),
                Err(err) => {
                    reporter.error(&err.to_string());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Doctor { version } => {
            let inputs = inputs_from_cli(&cli, &file)?;
            run_doctor(&cli, inputs, &file, version.as_deref());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(report: &PublishReport, cfg: &PublishConfig) -> ExitCode {
    if report.state != RunState::Done {
        ExitCode::FAILURE
    } else if report.is_success(cfg.partial_failure) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    }
}

fn load_file_config(path: Option<&Path>) -> Result<TfshipConfig> {
    match path {
        Some(path) => TfshipConfig::load_from_file(path),
        None => {
            let cwd = std::env::current_dir().context("failed to resolve current directory")?;
            Ok(TfshipConfig::load_from_dir(&cwd)?.unwrap_or_default())
        }
    }
}

fn inputs_from_cli(cli: &Cli, file: &TfshipConfig) -> Result<ConfigInputs> {
    let timeout = cli.timeout.as_deref().map(parse_duration).transpose()?;
    Ok(ConfigInputs {
        host: cli.host.clone().or_else(|| file.registry.host.clone()),
        organization: cli.organization.clone(),
        provider: cli.provider.clone(),
        key_id: cli.key_id.clone(),
        token: None,
        dist_dir: cli.dist_dir.clone(),
        gpg_key_file: cli.gpg_key_file.clone(),
        protocols: (!cli.protocols.is_empty()).then(|| cli.protocols.clone()),
        timeout,
        allow_partial: false,
    })
}

fn normalized_version(raw: &str, reporter: &mut dyn Reporter) -> String {
    let (version, stripped) = config::normalize_version(raw);
    if stripped {
        reporter.warn(&format!(
            "version {raw:?} has a tag prefix; publishing {version}"
        ));
    }
    version
}

fn parse_duration(s: &str) -> Result<Duration> {
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}

/// Host name as Terraform keys credentials: no scheme, no trailing slash.
fn credentials_host(host: &str) -> String {
    let base = normalize_base_url(host);
    base.split_once("://")
        .map(|(_, rest)| rest.to_string())
        .unwrap_or(base)
}

fn resolve_token(host: Option<&str>, file: &TfshipConfig) -> auth::AuthInfo {
    let host = host
        .or(file.registry.host.as_deref())
        .unwrap_or(config::DEFAULT_HOST);
    auth::resolve_token(&credentials_host(host), None)
}

fn print_report(report: &PublishReport) {
    println!("release: {}", report.release.label());
    println!("registry: {}", report.registry);
    println!("state: {}", report.state);
    if let Some(provider) = &report.provider {
        println!("provider: {}", outcome_label(provider));
    }
    if let Some(key) = &report.signing_key {
        println!("signing_key: {}", outcome_label(key));
    }
    if let Some(reason) = &report.abort_reason {
        println!("aborted: {reason}");
    }

    if !report.checksums.is_empty() {
        println!();
        for c in &report.checksums {
            println!("{}: {}", c.filename, item_label(&c.state));
        }
    }

    if !report.platforms.is_empty() {
        println!();
        for p in &report.platforms {
            let name = p
                .platform
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| p.filename.clone());
            println!(
                "{:>3}. {name}: {} ({}ms)",
                p.line,
                item_label(&p.state),
                p.duration_ms
            );
        }
    }

    if report.state == RunState::Done {
        println!();
        println!(
            "{} succeeded, {} failed",
            report.succeeded_count(),
            report.failed_count()
        );
    }
}

fn outcome_label(outcome: &EnsureOutcome) -> String {
    match outcome {
        EnsureOutcome::Created => "created".to_string(),
        EnsureOutcome::AlreadyExists => "already exists".to_string(),
        EnsureOutcome::Unexpected { status, .. } => format!("unexpected status {status}"),
    }
}

fn item_label(state: &ItemState) -> String {
    match state {
        ItemState::Published => "published".to_string(),
        ItemState::Skipped { reason } => format!("skipped ({reason})"),
        ItemState::Failed { kind, message } => format!("failed [{kind}] {message}"),
    }
}

fn run_doctor(cli: &Cli, inputs: ConfigInputs, file: &TfshipConfig, version: Option<&str>) {
    let host = inputs
        .host
        .clone()
        .unwrap_or_else(|| config::DEFAULT_HOST.to_string());
    let unset = || "<unset>".to_string();

    println!("registry: {}", normalize_base_url(&host));
    println!(
        "organization: {}",
        inputs
            .organization
            .clone()
            .or_else(|| file.registry.organization.clone())
            .unwrap_or_else(unset)
    );
    println!(
        "provider: {}",
        inputs
            .provider
            .clone()
            .or_else(|| file.provider.name.clone())
            .unwrap_or_else(unset)
    );
    println!(
        "key_id: {}",
        inputs
            .key_id
            .clone()
            .or_else(|| file.provider.key_id.clone())
            .unwrap_or_else(unset)
    );
    println!(
        "config_file: {}",
        cli.config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| {
                if Path::new(config::CONFIG_FILE).exists() {
                    config::CONFIG_FILE.to_string()
                } else {
                    "none".to_string()
                }
            })
    );

    let token = resolve_token(Some(host.as_str()), file);
    match &token.token {
        Some(t) => println!("token: {} ({})", auth::mask_token(t), token.source),
        None => println!("token: none"),
    }

    let dist_dir = inputs
        .dist_dir
        .clone()
        .or_else(|| file.artifacts.dist_dir.clone())
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_DIST_DIR));
    let key_file = inputs
        .gpg_key_file
        .clone()
        .or_else(|| file.artifacts.gpg_key_file.clone())
        .unwrap_or_else(|| dist_dir.join(config::DEFAULT_GPG_KEY_FILE));

    println!();
    print_presence("dist_dir", &dist_dir);
    print_presence("gpg_key_file", &key_file);

    let provider = inputs.provider.or_else(|| file.provider.name.clone());
    if let (Some(version), Some(provider)) = (version, provider) {
        let (version, _) = config::normalize_version(version);
        let sums = format!("terraform-provider-{provider}_{version}_SHA256SUMS");
        print_presence("checksums", &dist_dir.join(&sums));
        print_presence("signature", &dist_dir.join(format!("{sums}.sig")));
    }
}

fn print_presence(label: &str, path: &Path) {
    let status = if path.exists() { "found" } else { "missing" };
    println!("{label}: {} ({status})", path.display());
}
