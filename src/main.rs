use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tabled::{builder::Builder, settings::Style};

use squadrs::availability::AvailabilityPeriod;
use squadrs::config::AppConfig;
use squadrs::database::Database;
use squadrs::error::SquadRsError;
use squadrs::export::{export_payload, ExportFormat, ExportKind};
use squadrs::logging::{init_logging, LogLevel};
use squadrs::models::{RawTables, TeamId};
use squadrs::pipeline::{run_batch, BatchRequest, BatchResponse};

/// SquadRS - Squad readiness metrics engine
///
/// Recomputes windowed recovery and workload averages, chart series,
/// squad availability and alert baselines for a team.
#[derive(Parser)]
#[command(name = "squadrs")]
#[command(author = "SquadRS Contributors")]
#[command(version)]
#[command(about = "Squad readiness metrics engine", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb {
        /// Database file (defaults to the configured path)
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Load raw fact tables from a JSON file
    Load {
        /// JSON file holding the raw tables
        #[arg(short, long)]
        file: PathBuf,

        /// Team the athletes belong to
        #[arg(short, long)]
        team: Option<TeamId>,

        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Recompute every output table of a team
    Compute {
        #[arg(short, long)]
        team: Option<TeamId>,

        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Date treated as today (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,

        /// Rows fetched per page
        #[arg(long)]
        page_size: Option<usize>,

        /// Compute without writing outputs
        #[arg(long)]
        dry_run: bool,

        /// Also write the payload as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute a team and export part of the payload
    Export {
        #[arg(short, long)]
        team: Option<TeamId>,

        #[arg(short, long)]
        database: Option<PathBuf>,

        #[arg(long)]
        as_of: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (csv, json)
        #[arg(short = 'f', long, default_value = "json")]
        format: String,

        /// What to export (payload, all-time, alerts, availability)
        #[arg(short, long, default_value = "payload")]
        kind: String,
    },

    /// Show or update application settings
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Set the default team
        #[arg(long)]
        set_team: Option<TeamId>,

        /// Set the database path
        #[arg(long)]
        set_database: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        let body = match e.downcast_ref::<SquadRsError>() {
            Some(err) => err.to_error_body(),
            None => SquadRsError::Internal(format!("{:#}", e)).to_error_body(),
        };
        match serde_json::to_string_pretty(&body) {
            Ok(json) => println!("{}", json),
            Err(_) => eprintln!("{}", format!("Error: {:#}", e).red()),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let mut config = if config_path.exists() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    let mut log_config = config.logging.to_log_config()?;
    log_config.level = match cli.verbose {
        0 => log_config.level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    init_logging(&log_config)?;

    match cli.command {
        Commands::InitDb { database } => {
            let path = database.unwrap_or_else(|| config.database.path.clone());
            Database::new(&path)?;
            println!("{}", format!("✓ Database ready at {}", path.display()).green());
        }

        Commands::Load { file, team, database } => {
            let team_id = config.resolve_team(team)?;
            let path = database.unwrap_or_else(|| config.database.path.clone());
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let tables: RawTables = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse raw tables from {}", file.display()))?;

            let mut db = Database::new(&path)?;
            let rows = db.load_raw_tables(team_id, &tables)?;
            println!(
                "{}",
                format!("✓ Loaded {} rows for team {} ({} athletes)", rows, team_id, tables.athletes.len())
                    .green()
            );
        }

        Commands::Compute {
            team,
            database,
            as_of,
            page_size,
            dry_run,
            output,
        } => {
            let mut request = batch_request(&config, team, database, as_of.as_deref())?;
            if let Some(page_size) = page_size {
                request.page_size = page_size;
            }
            request.persist = config.engine.persist && !dry_run;

            println!("{}", format!("Computing team {}...", request.team_id).blue().bold());
            let response = run_batch(&request)?;
            print_summary(&response);

            if let Some(output) = output {
                export_payload(&response.payload, ExportFormat::Json, ExportKind::Payload, &output)?;
                println!("{}", format!("✓ Payload written to {}", output.display()).green());
            }
        }

        Commands::Export {
            team,
            database,
            as_of,
            output,
            format,
            kind,
        } => {
            let format: ExportFormat = format.parse()?;
            let kind: ExportKind = kind.parse()?;
            let mut request = batch_request(&config, team, database, as_of.as_deref())?;
            request.persist = false;

            let response = run_batch(&request)?;
            let written = export_payload(&response.payload, format, kind, &output)?;
            println!(
                "{}",
                format!("✓ Exported {} records to {}", written, output.display()).yellow()
            );
        }

        Commands::Config {
            init,
            set_team,
            set_database,
        } => {
            let changed = init || set_team.is_some() || set_database.is_some();
            if let Some(team) = set_team {
                config.engine.default_team_id = Some(team);
            }
            if let Some(path) = set_database {
                config.database.path = path;
            }
            if changed {
                config.save_to_file(&config_path)?;
                println!("{}", format!("✓ Configuration saved to {}", config_path.display()).green());
            } else {
                println!("{}", format!("# {}", config_path.display()).dimmed());
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn batch_request(
    config: &AppConfig,
    team: Option<TeamId>,
    database: Option<PathBuf>,
    as_of: Option<&str>,
) -> Result<BatchRequest> {
    let team_id = config.resolve_team(team)?;
    let database = database.unwrap_or_else(|| config.database.path.clone());
    let as_of = match as_of {
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid --as-of date: {}", date))?,
        None => Utc::now().date_naive(),
    };

    let mut request = BatchRequest::new(team_id, database);
    request.page_size = config.database.page_size;
    request.as_of = as_of;
    request.save_diagnostics = true;
    Ok(request)
}

fn print_summary(response: &BatchResponse) {
    let payload = &response.payload;

    let mut builder = Builder::default();
    builder.push_record(["Table", "Rows"]);
    for (table, rows) in payload.tables.row_counts() {
        builder.push_record([table.to_string(), rows.to_string()]);
    }
    println!("{}", builder.build().with(Style::modern()));

    let mut availability = Builder::default();
    availability.push_record(["Period", "Availability"]);
    for period in AvailabilityPeriod::ALL {
        availability.push_record([
            period.as_str().to_string(),
            format!("{}%", payload.availability.get(period)),
        ]);
    }
    println!("{}", availability.build().with(Style::modern()));

    let dbrt = payload.tables.dbrt;
    println!(
        "  Downtime: {} of {} scored days",
        dbrt.downtime_days.to_string().red(),
        dbrt.total_days
    );
    println!("  Run: {}", payload.run_id.to_string().dimmed());

    if response.persisted {
        println!("{}", format!("✓ Outputs replaced ({} ms)", response.duration_ms).green());
    } else {
        println!("{}", format!("✓ Computed without persisting ({} ms)", response.duration_ms).yellow());
    }
}
