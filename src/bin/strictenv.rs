use std::env;
use std::ffi::OsString;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{self, Command};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use strictenv::{
    ACCEPTED_ENV_FILES, DeclarationGenerator, DeclarationOutcome, Encoding, EnvLoader, EnvMap,
    EnvValue, Error, ResolutionMode, find_accepted_file,
};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "STRICTENV_LOG";

/// Load strict `.env` files, run commands with them and generate typings.
#[derive(Debug, Parser)]
#[command(name = "strictenv", version)]
struct Cli {
    /// Print loader diagnostics to stderr. Repeat for more detail.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Only print errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load env files and execute a command with the resolved variables.
    Run(RunArgs),
    /// Parse env files and print the resolved variables.
    Check(CheckArgs),
    /// Generate a TypeScript declaration stub for the resolved variables.
    Types(TypesArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Env file path(s). Repeat or pass comma-separated paths. Without this
    /// the first existing accepted file (.env.local ... .env) is used.
    #[arg(short, long = "file", value_delimiter = ',', env = "STRICTENV_FILE")]
    files: Vec<PathBuf>,
    /// Skip missing env files instead of failing.
    #[arg(short, long = "ignore-missing")]
    ignore_missing: bool,
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    encoding: EncodingArg,
    #[arg(long, value_enum, default_value_t = ResolutionArg::Graph)]
    resolution: ResolutionArg,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Keep variables that are already set in the environment.
    #[arg(long)]
    no_override: bool,
    /// Command to execute, followed by its arguments.
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Print a JSON object instead of KEY=VALUE lines.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct TypesArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Project directory holding tsconfig.json and the metadata file.
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,
    #[arg(long, default_value = strictenv::DEFAULT_OUTPUT_NAME)]
    output_name: String,
    #[arg(long, default_value = strictenv::DEFAULT_METADATA_FILE)]
    metadata_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EncodingArg {
    Utf8,
    Latin1,
}

impl From<EncodingArg> for Encoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Utf8 => Encoding::Utf8,
            EncodingArg::Latin1 => Encoding::Latin1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResolutionArg {
    Graph,
    Deferred,
}

impl From<ResolutionArg> for ResolutionMode {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::Graph => ResolutionMode::Graph,
            ResolutionArg::Deferred => ResolutionMode::Deferred,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    process::exit(run(cli));
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> i32 {
    let result = match cli.command {
        Commands::Run(args) => execute_run(args),
        Commands::Check(args) => execute_check(args).map(|()| 0),
        Commands::Types(args) => execute_types(args).map(|()| 0),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("strictenv: {err}");
            1
        }
    }
}

fn loader_for(source: &SourceArgs) -> EnvLoader {
    EnvLoader::new()
        .paths(&source.files)
        .required(!source.ignore_missing)
        .encoding(source.encoding.into())
        .resolution_mode(source.resolution.into())
}

fn execute_run(args: RunArgs) -> Result<i32, String> {
    let entries = loader_for(&args.source)
        .parse_only()
        .map_err(|err| err.to_string())?;

    let Some((program, program_args)) = args.command.split_first() else {
        return Err("missing command after `run`".to_owned());
    };
    let mut command = Command::new(program);
    command.args(program_args);

    for entry in entries {
        let EnvValue::Present(value) = entry.value else {
            continue;
        };
        if args.no_override && env::var_os(&entry.key).is_some() {
            tracing::debug!(key = %entry.key, "keeping existing environment value");
            continue;
        }
        command.env(entry.key, value);
    }

    execute_command(command, program)
}

fn execute_check(args: CheckArgs) -> Result<(), String> {
    let env = loader_for(&args.source)
        .parse_only()
        .map_err(|err| err.to_string())?;

    if args.json {
        println!("{}", to_json(&env));
    } else {
        for entry in &env {
            match &entry.value {
                EnvValue::Present(value) => println!("{}={value}", entry.key),
                EnvValue::Absent => println!("{}= # $optional", entry.key),
            }
        }
    }
    Ok(())
}

fn execute_types(args: TypesArgs) -> Result<(), String> {
    let source = match args.source.files.last() {
        Some(path) => path.clone(),
        None => find_accepted_file(&args.project_dir)
            .ok_or_else(|| {
                Error::NoEnvFile {
                    dir: args.project_dir.clone(),
                    tried: ACCEPTED_ENV_FILES.iter().map(|name| (*name).to_owned()).collect(),
                }
                .to_string()
            })?,
    };

    let mut loader = loader_for(&args.source);
    if args.source.files.is_empty() {
        loader = loader.path(&source);
    }
    let env = loader.parse_only().map_err(|err| err.to_string())?;

    let generator = DeclarationGenerator::new(&args.project_dir)
        .output_name(args.output_name)
        .metadata_file(args.metadata_file);
    let outcome = generator
        .generate(&env, &source)
        .map_err(|err| err.to_string())?;

    match outcome {
        DeclarationOutcome::Written(path) => println!("wrote {}", path.display()),
        DeclarationOutcome::UpToDate(path) => println!("{} is up to date", path.display()),
    }
    Ok(())
}

fn to_json(env: &EnvMap) -> Value {
    let map: Map<String, Value> = env
        .iter()
        .map(|entry| {
            let value = match &entry.value {
                EnvValue::Present(value) => Value::String(value.clone()),
                EnvValue::Absent => Value::Null,
            };
            (entry.key.clone(), value)
        })
        .collect();
    Value::Object(map)
}

#[cfg(unix)]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let err = command.exec();
    Err(format!(
        "failed to execute `{}`: {err}",
        program.to_string_lossy()
    ))
}

#[cfg(not(unix))]
fn execute_command(mut command: Command, program: &OsString) -> Result<i32, String> {
    let status = command
        .status()
        .map_err(|err| format!("failed to execute `{}`: {err}", program.to_string_lossy()))?;
    Ok(status.code().unwrap_or(1))
}
