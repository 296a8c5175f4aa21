use std::time::Duration;

use clap::{Parser, Subcommand};
use foundation::CameraPose;
use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod host;

use config::HostConfig;
use host::Host;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless map overlay host")]
struct Args {
    /// Use a local catalogue instead of the addon store service
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print installed and available addons with their state
    List,

    /// Set an addon's installed/active flags in the store and reconcile
    Set {
        /// Addon id (e.g. Ticketmaster)
        id: String,

        #[arg(long)]
        installed: bool,

        #[arg(long)]
        active: bool,
    },

    /// Look at a spot on the globe and report what the overlays show
    Run {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Camera height above the ellipsoid in metres
        #[arg(long, default_value_t = 20_000.0)]
        height: f64,

        /// How long to let loads settle before reporting
        #[arg(long, default_value_t = 2)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = HostConfig::from_env()?;
    if args.offline {
        info!("offline: using the built-in addon catalogue");
    } else {
        info!("addon store at {}", config.addon_store_url);
    }
    let host = Host::connect(&config, Client::new(), args.offline);

    match args.command {
        Command::List => {
            let (installed, available) = host.list().await?;
            for entry in installed {
                println!(
                    "installed\t{}\t{}\tactive={}\t{}",
                    entry.record.id, entry.state, entry.record.active, entry.record.name
                );
            }
            for entry in available {
                println!("available\t{}\t{}", entry.record.id, entry.record.name);
            }
        }
        Command::Set {
            id,
            installed,
            active,
        } => {
            let records = host.set(&id, installed, active).await?;
            for record in records {
                println!(
                    "{}\tinstalled={}\tactive={}",
                    record.id, record.installed, record.active
                );
            }
        }
        Command::Run {
            lat,
            lon,
            height,
            seconds,
        } => {
            if !foundation::is_valid_coordinate(lat, lon) || !height.is_finite() || height <= 0.0 {
                return Err(format!("invalid view {lat},{lon} at {height}m").into());
            }
            let pose = CameraPose::looking_down_at(lat, lon, height);
            info!("viewing {lat},{lon} from {height}m");
            let reports = host.run(pose, Duration::from_secs(seconds)).await?;
            for report in reports {
                println!("{}", serde_json::to_string(&report)?);
            }
        }
    }

    Ok(())
}
