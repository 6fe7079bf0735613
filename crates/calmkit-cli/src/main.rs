use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "calmkit", version, about = "Calmkit CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single countdown
    Countdown {
        /// Length in seconds (defaults to countdown.default_secs)
        secs: Option<u32>,
    },
    /// Paced breathing
    Breathe {
        /// box, 4-7-8, coherent or triangle (defaults to breathing.pattern)
        #[arg(long)]
        pattern: Option<String>,
        /// Full cycles to breathe; 0 breathes until interrupted
        #[arg(long)]
        rounds: Option<u32>,
    },
    /// Routine management
    Routine {
        #[command(subcommand)]
        action: commands::routine::RoutineAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Recent routine runs and totals
    History {
        /// Number of runs to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("CALMKIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Countdown { secs } => commands::session::countdown(secs),
        Commands::Breathe { pattern, rounds } => commands::session::breathe(pattern, rounds),
        Commands::Routine { action } => commands::routine::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::History { limit } => commands::history::run(limit),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "calmkit", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
