use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::Env;

use ldraw_tools::utils::session::Locations;
use ldraw_tools::{OutputFormat, commands, utils};

#[derive(Parser)]
#[command(name = "ldraw-tools")]
#[command(about = "LDraw model and connection inspection tool", long_about = None)]
#[command(version)]
struct Cli {
    /// LDraw library root (defaults to $LDRAWDIR)
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    library: Option<PathBuf>,

    /// Connection bundle, ldrconn.zip or an unpacked directory
    /// (defaults to $LDRAW_CONNECTIONS)
    #[arg(long, global = true, value_hint = clap::ValueHint::AnyPath)]
    connections: Option<PathBuf>,

    /// Disable coloured output (also set by NO_COLOR)
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a model summary
    Info {
        /// LDraw model (.ldr, .mpd or .dat)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the connection points of every part placed in a model
    Connections {
        /// LDraw model (.ldr, .mpd or .dat)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List connection types from the bundle
    Types {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List flexible parts from the bundle
    Flex {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    utils::color::configure(cli.no_color);

    // Initialize logger with default level (overridden by RUST_LOG)
    let env = Env::default().default_filter_or("warn");
    env_logger::Builder::from_env(env).init();

    let locations = Locations::resolve(cli.library, cli.connections);

    match cli.command {
        Commands::Info { file, format } => commands::info::execute(&locations, &file, format),
        Commands::Connections { file, format } => {
            commands::connections::execute(&locations, &file, format)
        }
        Commands::Types { format } => commands::types::execute(&locations, format),
        Commands::Flex { format } => commands::flex::execute(&locations, format),
    }
}
