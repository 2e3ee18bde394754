mod config;
mod plan_cmd;
mod prefs_cmd;
mod resolve;
mod show_cmd;
#[cfg(test)]
mod test_util;

use clap::{CommandFactory, Parser, Subcommand};

use dayplan_core::generator::openai::DEFAULT_MODEL;
use dayplan_db::config::DbConfig;
use dayplan_db::pool;

use config::DayplanConfig;

#[derive(Parser)]
#[command(name = "dayplan", about = "Turn a task list into a time-blocked day plan")]
struct Cli {
    /// Database URL (overrides DAYPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a dayplan config file (no database required)
    Init {
        /// SQLite connection URL (default: plans.db in the user data directory)
        #[arg(long)]
        db_url: Option<String>,
        /// Model used by the generation engine
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database and apply migrations
    DbInit,
    /// Plan a day from a task list
    Plan(plan_cmd::PlanArgs),
    /// Show a stored plan (today by default)
    Show {
        /// Date to show (YYYY-MM-DD or YYYY/MM/DD)
        #[arg(long, conflicts_with = "recent")]
        date: Option<String>,
        /// List the N most recent plans instead
        #[arg(long)]
        recent: Option<u32>,
    },
    /// Preference management
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
    /// Print a shell completion script
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Show the current preferences
    Show,
    /// Edit preferences interactively
    Edit,
}

/// Execute the `dayplan init` command: write config file.
fn cmd_init(db_url: Option<&str>, model: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let db_url = db_url.map_or_else(DbConfig::default_url, str::to_string);
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.clone(),
        },
        generator: config::GeneratorSection {
            model: Some(model.to_string()),
            ..Default::default()
        },
        planner: config::PlannerSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  generator.model = {model}");
    println!();
    println!(
        "Set {} (or generator.api_key in the file) to use the generation engine.",
        config::API_KEY_ENV
    );
    println!("Next: run `dayplan db-init` to create the database.");

    Ok(())
}

/// Execute the `dayplan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = DayplanConfig::resolve(cli_db_url, None)?;

    println!("Initializing dayplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("dayplan db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            model,
            force,
        } => {
            cmd_init(db_url.as_deref(), &model, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Plan(args) => {
            let resolved =
                DayplanConfig::resolve(cli.database_url.as_deref(), args.model.as_deref())?;
            let db_pool = pool::open(&resolved.db_config).await?;
            let result = plan_cmd::run_plan(args, &db_pool, resolved).await;
            db_pool.close().await;
            result?;
        }
        Commands::Show { date, recent } => {
            let resolved = DayplanConfig::resolve(cli.database_url.as_deref(), None)?;
            let date = resolve::resolve_date(date.as_deref(), chrono::Local::now().date_naive())?;
            let db_pool = pool::open(&resolved.db_config).await?;
            let result = show_cmd::run_show(&db_pool, date, recent).await;
            db_pool.close().await;
            result?;
        }
        Commands::Prefs { command } => {
            let resolved = DayplanConfig::resolve(cli.database_url.as_deref(), None)?;
            let db_pool = pool::open(&resolved.db_config).await?;
            let result = prefs_cmd::run_prefs_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "dayplan", &mut std::io::stdout());
        }
    }

    Ok(())
}
