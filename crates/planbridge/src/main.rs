use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use planbridge::cli::{Cli, Commands, ExportArgs, PlanArgs};
use planbridge::config::{self, ConfigError, PlanbridgeConfig};
use planbridge::domain::Document;
use planbridge::errors;
use planbridge::export::{self, ExportOptions, ExportResult, ExportStage, Exporter};
use planbridge::extract::{PlanError, Planner};
use planbridge::output::{self, Console, Envelope, ErrorEnvelope, ErrorKind, ExitCode, OutputSchema};
use planbridge::tracker::TrackerKind;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PLANBRIDGE_LOG";

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init();
}

/// Map errors to appropriate exit codes
fn error_to_exit_code(error: &anyhow::Error) -> ExitCode {
    if error.downcast_ref::<ConfigError>().is_some() {
        return ExitCode::InvalidArgument;
    }
    if error.downcast_ref::<PlanError>().is_some() {
        return ExitCode::ValidationFailed;
    }
    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => ExitCode::NotFound,
            std::io::ErrorKind::PermissionDenied => ExitCode::PermissionDenied,
            _ => ExitCode::GenericError,
        };
    }

    let error_msg = error.to_string().to_lowercase();
    if error_msg.contains("not found") {
        ExitCode::NotFound
    } else if error_msg.contains("invalid") || error_msg.contains("failed to parse") {
        ExitCode::InvalidArgument
    } else {
        ExitCode::GenericError
    }
}

fn error_kind(error: &anyhow::Error, exit_code: ExitCode) -> ErrorKind {
    if let Some(ConfigError::MissingToken { .. }) = error.downcast_ref::<ConfigError>() {
        return ErrorKind::MissingToken;
    }
    match exit_code {
        ExitCode::InvalidArgument => ErrorKind::ConfigError,
        ExitCode::NotFound => ErrorKind::DocumentNotFound,
        ExitCode::ValidationFailed => ErrorKind::PlanFailed,
        _ => ErrorKind::IoError,
    }
}

fn report_error(console: &Console, command: &str, error: &anyhow::Error, exit_code: ExitCode) {
    let diagnosis = error.downcast_ref::<ConfigError>().map(ConfigError::diagnose);

    if console.is_json() {
        let envelope = ErrorEnvelope::new(error_kind(error, exit_code), format!("{:#}", error), command);
        let envelope = match &diagnosis {
            Some(d) => envelope.suggest(d.render()),
            None => envelope,
        };
        let _ = console.envelope(&envelope);
        return;
    }

    match diagnosis {
        Some(d) => eprint!("Error: {}", d),
        None => eprintln!("Error: {:#}", error),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let console = Console::new(cli.quiet, cli.json);

    let command = match &cli.command {
        Commands::Parse { .. } => "parse",
        Commands::Preview(_) => "preview",
        Commands::Export { .. } => "export",
        Commands::Schema => "schema",
    };

    let exit_code = match run(cli, &console) {
        Ok(code) => code,
        Err(e) => {
            let code = error_to_exit_code(&e);
            report_error(&console, command, &e, code);
            code
        }
    };

    if exit_code != ExitCode::Success {
        std::process::exit(exit_code.code());
    }
}

fn run(cli: Cli, console: &Console) -> Result<ExitCode> {
    let lookup = |key: &str| env::var(key).ok();
    let cwd = env::current_dir()?;
    let (config_path, explicit) = config::resolve_path(cli.config.as_deref(), &lookup, &cwd);
    debug!(path = %config_path.display(), "Loading configuration");

    match cli.command {
        Commands::Schema => {
            let schema = schemars::schema_for!(OutputSchema);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::Success)
        }
        Commands::Parse { files, plan } => {
            let config = PlanbridgeConfig::load(&config_path, explicit)?;
            let options = apply_plan_args(config.export_options()?, &plan);
            let documents = read_documents(&files)?;

            let mut planner = Planner::new()
                .with_extractor(options.strategy.build())
                .with_policy(options.phase_policy);
            if let Some(today) = options.today {
                planner = planner.with_today(today);
            }
            let plan = planner.plan(&documents)?;

            if console.is_json() {
                console.envelope(&Envelope::ok(&plan, "parse"))?;
            } else {
                console.text(output::format_plan(&plan).trim_end())?;
            }
            Ok(ExitCode::Success)
        }
        Commands::Preview(args) => {
            let config = PlanbridgeConfig::load(&config_path, explicit)?;
            let documents = read_documents(&args.files)?;
            let options = export_options(&config, &args)?;
            let result = export::preview(args.target, &documents, &options);
            print_result(console, "preview", &result)
        }
        Commands::Export { args, dry_run } => {
            let config = PlanbridgeConfig::load(&config_path, explicit)?;
            let documents = read_documents(&args.files)?;
            let mut options = export_options(&config, &args)?;
            options.dry_run = dry_run;

            let result = if dry_run {
                export::preview(args.target, &documents, &options)
            } else {
                let tracker = config.connect(args.target, &lookup)?;
                Exporter::new(tracker).export(&documents, &options)
            };
            print_result(console, "export", &result)
        }
    }
}

fn read_documents(files: &[impl AsRef<Path>]) -> Result<Vec<Document>> {
    files
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read document {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Document::new(name, content))
        })
        .collect()
}

fn apply_plan_args(mut options: ExportOptions, args: &PlanArgs) -> ExportOptions {
    if let Some(strategy) = args.strategy {
        options.strategy = strategy;
    }
    if let Some(policy) = args.phase_policy {
        options.phase_policy = policy;
    }
    if args.today.is_some() {
        options.today = args.today;
    }
    options
}

fn export_options(config: &PlanbridgeConfig, args: &ExportArgs) -> Result<ExportOptions> {
    let mut options = apply_plan_args(config.export_options()?, &args.plan);
    if args.top_level.is_some() {
        options.top_level = args.top_level.clone();
    }
    if args.no_containers {
        options.create_containers = false;
    }
    if args.no_label_sync {
        options.sync_labels = false;
    }
    if args.no_labels {
        options.attach_labels = false;
    }
    Ok(options)
}

fn print_result(console: &Console, command: &str, result: &ExportResult) -> Result<ExitCode> {
    if result.stage == ExportStage::Verifying {
        if let Some(message) = result.errors.first() {
            return report_verification(console, command, result.tracker, message);
        }
    }

    if console.is_json() {
        console.envelope(&Envelope::new(result.is_success(), result, command))?;
    } else {
        console.text(output::format_export(result).trim_end())?;
        if result.plan.as_ref().is_some_and(|p| p.synthesized_phases) {
            console.warn("No phases found; containers use synthesized default phases")?;
        }
    }
    Ok(ExitCode::for_export(result))
}

fn report_verification(
    console: &Console,
    command: &str,
    tracker: TrackerKind,
    message: &str,
) -> Result<ExitCode> {
    let diagnosis = errors::verification_failed(tracker, message);
    let kind = ErrorKind::VerificationFailed;
    if console.is_json() {
        let envelope =
            ErrorEnvelope::new(kind, diagnosis.summary(), command).suggest(diagnosis.render());
        console.envelope(&envelope)?;
    } else {
        eprint!("Error: {}", diagnosis);
    }
    Ok(kind.exit_code())
}
