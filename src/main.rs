use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use jarstrip::{
    ArchiveTransformer, Classpath, Config, ParseErrorPolicy, ReflectConfig, register_namespaces,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Rewrite a jar so that anything touching a disallowed namespace throws at runtime
#[derive(Parser, Debug)]
#[command(name = "jarstrip", version, about, long_about = None)]
struct Cli {
    /// Source jar
    input: Option<PathBuf>,

    /// Destination jar (created or overwritten)
    output: Option<PathBuf>,

    /// Disallowed type-name prefix, e.g. `java.awt.` or `java/awt/`
    #[arg(long)]
    prefix: Option<String>,

    /// Exception class thrown at rewritten sites
    #[arg(long)]
    exception: Option<String>,

    /// Text placed before the member name in each failure message
    #[arg(long)]
    message_prefix: Option<String>,

    /// What to do with a class entry that cannot be parsed
    #[arg(long, value_parser = ["abort", "copy"])]
    on_parse_error: Option<String>,

    /// JSON config file; command-line flags take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (`error`, `warn`, `info`, `debug`, `trace`); overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a GraalVM reflect-config.json for every class in the given packages
    ReflectConfig {
        /// Package whose classes (and subpackages) are registered; repeatable
        #[arg(long = "package")]
        packages: Vec<String>,

        /// Class registered by name; repeatable
        #[arg(long = "class")]
        classes: Vec<String>,

        /// Directory or jar searched for classes; repeatable
        #[arg(long)]
        classpath: Vec<PathBuf>,

        /// Where to write the JSON (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match &cli.command {
        Some(Commands::ReflectConfig {
            packages,
            classes,
            classpath,
            output,
        }) => reflect_config(&cli, packages, classes, classpath, output.as_deref()),
        None => match (&cli.input, &cli.output) {
            (Some(input), Some(output)) => strip(&cli, input, output),
            _ => {
                println!("{}", Cli::command().render_usage());
                return ExitCode::from(2);
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path).context("Failed to load configuration"),
        None => Ok(Config::default()),
    }
}

fn strip(cli: &Cli, input: &Path, output: &Path) -> Result<()> {
    let mut config = load_config(cli)?.strip;
    if let Some(prefix) = &cli.prefix {
        config.disallowed_prefix = prefix.clone();
    }
    if let Some(exception) = &cli.exception {
        config.exception_class = exception.clone();
    }
    if let Some(message_prefix) = &cli.message_prefix {
        config.message_prefix = message_prefix.clone();
    }
    if let Some(policy) = &cli.on_parse_error {
        config.on_parse_error = policy
            .parse::<ParseErrorPolicy>()
            .map_err(anyhow::Error::msg)?;
    }

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        prefix = %config.disallowed_prefix,
        "Stripping jar"
    );
    let report = ArchiveTransformer::new(config)
        .transform(input, output)
        .with_context(|| format!("Failed to transform {}", input.display()))?;
    tracing::info!(
        entries = report.entries,
        classes = report.classes,
        rewritten = report.rewritten_classes,
        calls = report.call_sites,
        fields = report.field_sites,
        passed_through = report.passed_through.len(),
        sha256 = %report.sha256,
        "Transform complete"
    );

    let written = std::fs::canonicalize(output)
        .with_context(|| format!("Failed to resolve {}", output.display()))?;
    println!("Transformed jar written to {}", written.display());
    Ok(())
}

fn reflect_config(
    cli: &Cli,
    packages: &[String],
    classes: &[String],
    classpath: &[PathBuf],
    output: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(cli)?.scan;
    if !packages.is_empty() {
        config.packages = packages.to_vec();
    }
    if !classes.is_empty() {
        config.classes = classes.to_vec();
    }
    if !classpath.is_empty() {
        config.classpath = classpath.to_vec();
    }
    if config.classpath.is_empty() {
        anyhow::bail!("No classpath roots given (use --classpath or the config file)");
    }

    let roots = Classpath::open(&config.classpath).context("Failed to open classpath")?;
    let mut reflect = ReflectConfig::new();
    let report = register_namespaces(&roots, &config, &mut reflect);
    tracing::info!(
        registered = report.registered,
        failed = report.failures.len(),
        "Registration complete"
    );

    let json = reflect.to_json().context("Failed to serialize reflect config")?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
