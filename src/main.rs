use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use modelboard::app;
use modelboard::config::{Config, ConfigOverrides};
use modelboard::leaderboard::persist;
use modelboard::output::{leaderboard_to_csv, render_json, render_leaderboard_table};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "modelboard",
    about = "Evaluation queue and durable leaderboard for model submissions"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the submission API, evaluation worker and periodic persister
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long = "eval-url")]
        eval_url: Option<String>,
        #[arg(long = "vibe-url")]
        vibe_url: Option<String>,
        #[arg(long)]
        leaderboard: Option<String>,
        #[arg(long = "mirror-url")]
        mirror_url: Option<String>,
    },
    /// Render the persisted leaderboard
    Show {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            eval_url,
            vibe_url,
            leaderboard,
            mirror_url,
        } => {
            config.apply_overrides(ConfigOverrides {
                host,
                port,
                eval_url,
                vibe_url,
                leaderboard_path: leaderboard,
                mirror_url,
            });
            app::run(config).await
        }
        Commands::Show { output } => {
            let path = config.resolved_leaderboard_path();
            if !path.exists() {
                println!("no leaderboard at {}", path.display());
                return Ok(());
            }
            let records = persist::read_csv(&path)?;
            match output {
                OutputFormat::Table => println!("{}", render_leaderboard_table(&records)),
                OutputFormat::Json => println!("{}", render_json(&records)?),
                OutputFormat::Csv => println!("{}", leaderboard_to_csv(&records)?),
            }
            Ok(())
        }
        Commands::Config { init, show } => {
            if init {
                Config::write_template(&config_path)?;
                println!("Wrote config template to {}", config_path.display());
            }
            if show || !init {
                println!("{}", render_json(&config)?);
            }
            Ok(())
        }
    }
}
