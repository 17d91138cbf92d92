mod console;
mod session;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use prism_core::{BackendKind, Mode, PrismConfig, SceneContext};
use prism_render::{GpuBackend, HeadlessBackend, Pipeline, PipelineRegistry};

use session::{Input, Outcome, Script, Session, Step, HELP};

const DEFAULT_CONFIG: &str = "prism.toml";

#[derive(Parser)]
#[command(
    name = "prism",
    version,
    about = "Prism: switch between real-time rendering pipelines at runtime"
)]
struct Cli {
    /// Path to a prism.toml (default: ./prism.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session, render some frames and shut down
    Run {
        /// Initial mode: naive, forward+ or "clustered deferred"
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Number of frames to render
        #[arg(short, long, default_value_t = 60)]
        frames: u32,

        /// GPU backend: headless or wgpu
        #[arg(short, long)]
        backend: Option<BackendKind>,
    },

    /// Replay a TOML session script
    Script {
        /// Path to the script file
        #[arg()]
        file: PathBuf,
    },

    /// Drive a session from stdin
    Interactive,

    /// List modes and the capabilities each declares
    Modes {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    InitConfig {
        /// Where to write it
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            mode,
            frames,
            backend,
        } => {
            let mut config = config;
            if let Some(mode) = mode {
                config.render.default_mode = mode;
            }
            if let Some(backend) = backend {
                config.render.backend = backend;
            }
            cmd_run(&config, frames)
        }
        Commands::Script { file } => cmd_script(&config, &file),
        Commands::Interactive => cmd_interactive(&config),
        Commands::Modes { json } => cmd_modes(json),
        Commands::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<PrismConfig> {
    match path {
        Some(path) => PrismConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            PrismConfig::load_from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG))
        }
        None => Ok(PrismConfig::default()),
    }
}

fn cmd_run(config: &PrismConfig, frames: u32) -> Result<()> {
    let mut session = Session::from_config(config)?;
    if let Outcome::Rendered(Some(report)) =
        session.apply(&Step::Frames { count: frames })?
    {
        println!(
            "{}: {} frames, last pass list: {}",
            report.mode,
            frames,
            report.passes.join(" -> ")
        );
    }
    println!("{}", session.status());
    session.shutdown()
}

fn cmd_script(config: &PrismConfig, file: &Path) -> Result<()> {
    let script = Script::load(file)?;
    let mut session = Session::from_config(config)?;

    for (i, step) in script.steps.iter().enumerate() {
        let outcome = session
            .apply(step)
            .with_context(|| format!("Step {} ({:?}) failed", i + 1, step))?;
        print_outcome(&outcome);
    }
    session.shutdown()
}

fn cmd_interactive(config: &PrismConfig) -> Result<()> {
    let mut session = Session::from_config(config)?;
    println!("{}", HELP);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut lines = stdin.lock().lines();
    loop {
        print!("prism> ");
        stdout.flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Input>() {
            Ok(Input::Quit) => break,
            Ok(Input::Help) => println!("{}", HELP),
            Ok(Input::Step(step)) => match session.apply(&step) {
                Ok(outcome) => print_outcome(&outcome),
                // A failed switch leaves no pipeline; the user can select another mode.
                Err(e) => eprintln!("error: {:#}", e),
            },
            Err(e) => eprintln!("error: {:#}", e),
        }
    }
    session.shutdown()
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Applied => {}
        Outcome::Rendered(Some(report)) => println!(
            "{} frame {}: {} ({} lights)",
            report.mode,
            report.frame_index,
            report.passes.join(" -> "),
            report.light_count
        ),
        Outcome::Rendered(None) => {}
        Outcome::Status(status) => println!("{}", status),
    }
}

#[derive(Serialize)]
struct ModeInfo {
    mode: Mode,
    capabilities: Vec<String>,
}

fn cmd_modes(json: bool) -> Result<()> {
    let scene = Arc::new(SceneContext::default());
    let backend: Arc<dyn GpuBackend> = Arc::new(HeadlessBackend::new());
    let registry = PipelineRegistry::builtin();

    let mut modes = Vec::new();
    for mode in Mode::ALL {
        let mut pipeline = registry.construct(mode, &scene, &backend)?;
        let capabilities = pipeline
            .capabilities()
            .iter()
            .map(|c| c.to_string())
            .collect();
        pipeline.stop()?;
        modes.push(ModeInfo { mode, capabilities });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&modes)?);
    } else {
        for info in &modes {
            if info.capabilities.is_empty() {
                println!("{}", info.mode);
            } else {
                println!("{} ({})", info.mode, info.capabilities.join(", "));
            }
        }
    }
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PrismConfig::default()
        .save_to_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
