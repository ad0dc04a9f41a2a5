use clap::{Parser, Subcommand};
use sotto::{config, controller, daemon};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sotto")]
#[command(author, version, about = "Toggleable voice dictation daemon", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Toggle recording, launching the daemon first if needed
    Toggle,

    /// Run the daemon in the foreground (toggle spawns this detached)
    Daemon,

    /// Stop the running daemon
    Stop,

    /// Check daemon status
    Status,

    /// Configure settings
    Config {
        /// Set the Whisper model (tiny, base, small, medium, large-v3)
        #[arg(long)]
        model: Option<String>,

        /// Set the language (auto, en, de, etc.)
        #[arg(long)]
        language: Option<String>,

        /// Set the text-injection command (e.g. "wtype --")
        #[arg(long)]
        inject_cmd: Option<String>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("sotto=debug,whisper_rs=info")
    } else {
        EnvFilter::new("sotto=info,whisper_rs=warn")
    }
}

/// Initialize logging. In daemon mode the controller has discarded our
/// stdio, so a daily-rolling log file under the data dir is added; the
/// returned guard flushes it on drop.
fn init_logging(
    verbose: bool,
    daemon_mode: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if daemon_mode {
        if let Ok(data_dir) = config::data_dir() {
            let logs_dir = data_dir.join("logs");
            let _ = std::fs::create_dir_all(&logs_dir);

            let appender = tracing_appender::rolling::daily(&logs_dir, "sotto.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(log_filter(verbose))
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();

            return Some(guard);
        }
    }

    tracing_subscriber::registry()
        .with(log_filter(verbose))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, matches!(cli.command, Commands::Daemon));

    match cli.command {
        Commands::Toggle => {
            controller::toggle_or_launch()?;
        }

        Commands::Daemon => {
            info!("Starting sotto daemon...");
            daemon::run().await?;
        }

        Commands::Stop => {
            info!("Stopping sotto daemon...");
            daemon::stop()?;
        }

        Commands::Status => {
            daemon::status()?;
        }

        Commands::Config {
            model,
            language,
            inject_cmd,
            show,
        } => {
            if show {
                config::show()?;
            } else {
                config::update(model, language, inject_cmd)?;
            }
        }
    }

    Ok(())
}
