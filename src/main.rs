//! compact-wheel CLI
//!
//! Entry point for the `compact-wheel` command-line tool.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use compact_deps::ReplaceRules;
use compact_wheel::compiler::PythonCompiler;
use compact_wheel::config::{CompactConfig, EffectiveConfig};
use compact_wheel::metadata::{
    InstalledMetadata, MetadataProvider, MetadataSource, ProjectMetadata,
};
use compact_wheel::pipeline::{BuildRequest, Pipeline, PipelineError, ReplaceOutcome, Toolchain};
use compact_wheel::project::{PoetryInstaller, PYPROJECT_FILE};
use compact_wheel::python::Interpreter;
use compact_wheel::signal::InterruptFlag;
use compact_wheel::stubs::Stubgen;
use compact_wheel::wheel::verify_wheel;
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "compact-wheel")]
#[command(about = "Build bytecode-only Python wheels", version)]
struct Cli {
    /// Project directory holding pyproject.toml
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Show tool output, debug logs, and keep build artifacts
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a package into a bytecode wheel
    Build(BuildArgs),

    /// Replace dependencies by their compact variants in pyproject.toml
    Replace {
        /// Dependency names to replace
        #[arg(long = "replace", value_name = "NAME")]
        names: Vec<String>,

        /// Replace every dependency starting with this prefix
        #[arg(long = "prefix", value_name = "PREFIX")]
        prefixes: Vec<String>,

        /// Suffix of compact distributions (default: -compact)
        #[arg(long)]
        suffix: Option<String>,

        /// Package source for replaced dependencies
        #[arg(long)]
        dependency_source: Option<String>,

        /// Interpreter whose version the python constraint is pinned to
        #[arg(long)]
        python: Option<String>,
    },

    /// Check a wheel's contents against its RECORD
    Verify {
        /// Wheel file
        wheel: PathBuf,
    },
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Distribution name of the package
    name: String,

    /// Importable package name (default: NAME)
    #[arg(long)]
    package: Option<String>,

    /// Package source directory (default: PACKAGE inside the project)
    #[arg(long)]
    source: Option<PathBuf>,

    /// Output directory for wheels (default: dist)
    #[arg(long)]
    target: Option<PathBuf>,

    /// Replace this dependency by its compact variant before building
    #[arg(long = "replace-dependency", value_name = "NAME")]
    replace_dependency: Vec<String>,

    /// Package source for replaced dependencies
    #[arg(long)]
    dependency_source: Option<String>,

    /// Skip the bytecode wheel
    #[arg(long)]
    no_package: bool,

    /// Also build a typing stubs wheel
    #[arg(long)]
    with_stubs: bool,

    /// Keep docstrings and assertions
    #[arg(long)]
    no_optimize: bool,

    /// Where wheel metadata comes from
    #[arg(long, value_parser = ["installed", "project"])]
    metadata: Option<String>,

    /// Package whatever compiled even if the compiler reports errors
    #[arg(long)]
    ignore_compile_errors: bool,

    /// Interpreter used for compilation
    #[arg(long)]
    python: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build(args) => run_build(&cli.project_dir, cli.verbose, args),
        Commands::Replace {
            names,
            prefixes,
            suffix,
            dependency_source,
            python,
        } => {
            let mut overrides = Map::new();
            if !names.is_empty() {
                overrides.insert("replace".into(), names.into());
            }
            if !prefixes.is_empty() {
                overrides.insert("prefixes".into(), prefixes.into());
            }
            insert_some(&mut overrides, "suffix", suffix);
            insert_some(&mut overrides, "dependency-source", dependency_source);
            insert_some(&mut overrides, "python", python);
            run_replace(&cli.project_dir, cli.verbose, overrides);
        }
        Commands::Verify { wheel } => run_verify(&wheel),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn insert_some(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value));
    }
}

fn load_config(project_dir: &Path, overrides: Map<String, Value>) -> CompactConfig {
    let pyproject = project_dir.join(PYPROJECT_FILE);
    match EffectiveConfig::build(Some(&pyproject), Some(Value::Object(overrides))) {
        Ok(effective) => effective.config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn detect_interpreter(executable: &str) -> Interpreter {
    match Interpreter::detect(executable) {
        Ok(interpreter) => interpreter,
        Err(e) => {
            eprintln!("Error detecting Python interpreter: {}", e);
            process::exit(1);
        }
    }
}

fn install_interrupt() -> InterruptFlag {
    let interrupt = InterruptFlag::new();
    if let Err(e) = interrupt.install() {
        eprintln!("Warning: failed to install signal handler: {}", e);
    }
    interrupt
}

fn config_rules(config: &CompactConfig) -> ReplaceRules {
    ReplaceRules::new(&config.suffix)
        .with_names(&config.replace)
        .with_prefixes(&config.prefixes)
}

fn run_build(project_dir: &Path, verbose: bool, args: BuildArgs) {
    let mut overrides = Map::new();
    if let Some(target) = &args.target {
        overrides.insert("target".into(), target.to_string_lossy().into_owned().into());
    }
    if args.no_optimize {
        overrides.insert("optimize".into(), false.into());
    }
    if args.ignore_compile_errors {
        overrides.insert("ignore-compile-errors".into(), true.into());
    }
    insert_some(&mut overrides, "dependency-source", args.dependency_source);
    insert_some(&mut overrides, "metadata", args.metadata);
    insert_some(&mut overrides, "python", args.python);

    let config = load_config(project_dir, overrides);
    let interrupt = install_interrupt();
    let interpreter = detect_interpreter(&config.python);
    let python = interpreter.version();

    let compiler = PythonCompiler::new(interpreter.clone());
    let stub_root = args
        .source
        .as_deref()
        .and_then(Path::parent)
        .map(|parent| project_dir.join(parent))
        .unwrap_or_else(|| project_dir.to_path_buf());
    let stub_generator = Stubgen::new(&config.stubgen).with_working_dir(stub_root);
    let installer = PoetryInstaller::new(&config.installer).with_quiet(!verbose);

    let metadata: Box<dyn MetadataProvider> = match config.metadata {
        MetadataSource::Installed => Box::new(InstalledMetadata::new(interpreter)),
        MetadataSource::Project => {
            let provider = ProjectMetadata::new(project_dir, python, &config.suffix);
            let rules = config_rules(&config);
            if rules.is_empty() {
                Box::new(provider)
            } else {
                Box::new(provider.with_replacements(rules, config.dependency_source.clone()))
            }
        }
    };

    let toolchain = Toolchain {
        compiler: &compiler,
        stub_generator: &stub_generator,
        metadata: metadata.as_ref(),
        installer: &installer,
        python,
    };
    let pipeline = Pipeline::new(config, toolchain).with_interrupt(interrupt);

    let mut request = BuildRequest::new(project_dir, &args.name);
    request.importable_name = args.package;
    request.source_dir = args.source;
    request.build_package = !args.no_package;
    request.build_stubs = args.with_stubs;
    request.replace = args.replace_dependency;
    request.verbose = verbose;

    match pipeline.build(&request) {
        Ok(outcome) => {
            if !outcome.replacements.is_empty() {
                println!("Replaced dependencies to binary ones");
            }
            if let Some(wheel) = &outcome.package_wheel {
                println!("Compiled package wheel {}", wheel.display());
            }
            if let Some(wheel) = &outcome.stubs_wheel {
                println!("Compiled stubs wheel {}", wheel.display());
            }
            if outcome.cleaned {
                println!("Compilation process artifacts cleared");
            }
        }
        Err(PipelineError::ReplacementFailed(reason)) => {
            eprintln!("{}", reason);
            println!("Build process failed");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_replace(project_dir: &Path, verbose: bool, overrides: Map<String, Value>) {
    let config = load_config(project_dir, overrides);
    let interrupt = install_interrupt();
    let interpreter = detect_interpreter(&config.python);
    let python = interpreter.version();

    let compiler = PythonCompiler::new(interpreter.clone());
    let stub_generator = Stubgen::new(&config.stubgen);
    let metadata = InstalledMetadata::new(interpreter);
    let installer = PoetryInstaller::new(&config.installer).with_quiet(!verbose);

    let toolchain = Toolchain {
        compiler: &compiler,
        stub_generator: &stub_generator,
        metadata: &metadata,
        installer: &installer,
        python,
    };
    let pipeline = Pipeline::new(config, toolchain).with_interrupt(interrupt);

    match pipeline.replace(project_dir) {
        Ok(ReplaceOutcome::NothingToReplace) => println!("Nothing to replace."),
        Ok(ReplaceOutcome::NothingReplaced) => println!("No dependency matched."),
        Ok(ReplaceOutcome::Replaced(replacements)) => {
            println!("Fixed Python version to {}", python.pinned_constraint());
            for replacement in &replacements {
                println!("  {} -> {}", replacement.original, replacement.replacement);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_verify(wheel: &Path) {
    match verify_wheel(wheel) {
        Ok(report) => {
            println!("Wheel valid: {}", wheel.display());
            println!("  Files verified: {}", report.verified);
            println!("  Record: {}", report.record_path);
        }
        Err(e) => {
            eprintln!("Wheel invalid: {}", e);
            process::exit(1);
        }
    }
}
