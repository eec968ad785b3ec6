use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use rentacar_booking::config::{BookingConfig, StorageBackend};
use rentacar_booking::domain::ReservationOperations;
use rentacar_booking::storage::PgBookingStore;
use rentacar_booking::BookingEngine;
use rentacar_common::logging::{self, LogFormat};
use rentacar_common::ConfigLoader;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
#[command(name = "rentacar-booking")]
#[command(about = "Rentacar booking engine - availability, pricing and proximity search")]
struct Args {
    #[arg(short, long, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Generate sample configuration file")]
    gen_config: bool,

    #[arg(long, help = "Dry run mode (validate config without connecting)")]
    dry_run: bool,

    #[arg(long, env = "RENTACAR_LOG_FORMAT", default_value_t = LogFormat::Compact, help = "Log output: compact or json")]
    log_format: LogFormat,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// List vehicles within a radius of a point, nearest first
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, default_value_t = 5.0)]
        radius_km: f64,
    },

    /// List vehicles free for a time window (RFC 3339 timestamps)
    Available {
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_logging(&args.verbosity, "rentacar_booking=info", args.log_format)?;

    if args.gen_config {
        println!("{}", BookingConfig::generate_example()?);
        return Ok(());
    }

    let config = BookingConfig::load(args.config.as_deref())?;

    info!("Environment: {}", config.service.environment);
    info!("Service ID: {}", config.service.service_id);

    if args.dry_run {
        info!("Configuration validated successfully (dry-run mode)");
        return Ok(());
    }

    match args.command {
        Some(Command::Migrate) => {
            if config.storage.backend != StorageBackend::Postgres {
                bail!("migrations require storage.backend = \"postgres\"");
            }
            let store = PgBookingStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            store.run_migrations().await?;
        }
        Some(Command::Nearby { lat, lon, radius_km }) => {
            let engine = BookingEngine::connect(&config).await?;
            let nearby = engine.catalog().nearby(lat, lon, radius_km).await?;
            println!("{}", serde_json::to_string_pretty(&nearby)?);
        }
        Some(Command::Available { start, end }) => {
            let engine = BookingEngine::connect(&config).await?;
            let free = engine.free_vehicles(start, end).await?;
            println!("{}", serde_json::to_string_pretty(&free)?);
        }
        None => {
            let engine = BookingEngine::connect(&config).await?;
            let vehicles = engine.catalog().all().await?;
            let reservations = engine.reservations().all().await?;
            let active = reservations.iter().filter(|r| r.is_active()).count();
            info!(
                "Fleet of {} vehicles, {} reservations ({} active)",
                vehicles.len(),
                reservations.len(),
                active
            );
        }
    }

    Ok(())
}
