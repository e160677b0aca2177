use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tabula_core::{Dialect, LockPolicy, SchemaRegistry, TabulaConfig};
use tabula_sql::{Paginator, SortOrder};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "tabula", version, about = "Tabula schema and filter tooling")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, default_value = "tabula.yaml", env = "TABULA_CONFIG")]
    config: PathBuf,

    /// SQL dialect (postgres, mysql, sqlite). Defaults to the configured one.
    #[arg(long, global = true, value_parser = parse_dialect)]
    dialect: Option<Dialect>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and every schema.
    Check,

    /// Print CREATE TABLE and CREATE INDEX statements.
    Ddl {
        /// Only this schema. All schemas when omitted.
        #[arg(long)]
        schema: Option<String>,

        /// Add ON DELETE CASCADE to every foreign key.
        #[arg(long, default_value_t = false)]
        cascade: bool,
    },

    /// Print ALTER statements for a table created from older DDL.
    Alter {
        #[arg(long)]
        schema: String,

        /// File holding the DDL the table was created with.
        #[arg(long)]
        previous: PathBuf,

        #[arg(long, default_value_t = false)]
        cascade: bool,
    },

    /// Compile a JSON filter into a WHERE fragment.
    Filter {
        #[arg(long)]
        schema: String,

        /// Filter object, e.g. '{"tenant_id": "t1"}'.
        filter: String,
    },

    /// Print the SELECT a list operation would run.
    Select {
        #[arg(long)]
        schema: String,

        /// Filter object. Matches everything when omitted.
        #[arg(default_value = "{}")]
        filter: String,

        /// Nest related resources.
        #[arg(long, default_value_t = false)]
        details: bool,

        /// Comma separated field list.
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        #[arg(long)]
        sort_key: Option<String>,

        #[arg(long, value_parser = parse_sort_order)]
        sort_order: Option<SortOrder>,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,

        /// Lock the selected rows for update.
        #[arg(long, default_value_t = false)]
        for_update: bool,
    },
}

fn parse_dialect(s: &str) -> Result<Dialect, String> {
    Dialect::from_url(s).ok_or_else(|| format!("unknown dialect '{}'", s))
}

fn parse_sort_order(s: &str) -> Result<SortOrder, String> {
    s.parse::<SortOrder>().map_err(|e| e.to_string())
}

/// Configuration with its schemas loaded.
struct Loaded {
    config: TabulaConfig,
    registry: SchemaRegistry,
    dialect: Dialect,
}

fn load(path: &Path, dialect: Option<Dialect>) -> anyhow::Result<Loaded> {
    let config = TabulaConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let registry = config.load_schemas()?;
    let dialect = match dialect {
        Some(dialect) => dialect,
        None => config
            .database
            .dialect()
            .context("pass --dialect or set database.dialect")?,
    };
    tracing::debug!(
        config = %path.display(),
        schemas = registry.len(),
        dialect = %dialect,
        "Loaded configuration"
    );
    Ok(Loaded {
        config,
        registry,
        dialect,
    })
}

/// Log to stderr so generated SQL on stdout stays clean. `RUST_LOG` wins
/// over the configured level.
fn init_tracing(config_path: &Path) {
    let level = TabulaConfig::from_file(config_path)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.config);

    let loaded = load(&cli.config, cli.dialect)?;
    let Loaded {
        config,
        registry,
        dialect,
    } = &loaded;

    match cli.cmd {
        Command::Check => {
            let results = commands::check::run(config, registry, *dialect);
            for finding in &results.findings {
                println!("{}", finding);
            }
            println!(
                "{} schemas checked: {} errors, {} warnings",
                registry.len(),
                results.count(commands::check::Severity::Error),
                results.count(commands::check::Severity::Warning)
            );
            if results.has_errors() {
                bail!("check failed");
            }
        }

        Command::Ddl { schema, cascade } => {
            let statements = commands::ddl::create(
                registry,
                *dialect,
                schema.as_deref(),
                cascade || config.ddl.cascade,
            )?;
            print!("{}", commands::ddl::script(&statements));
        }

        Command::Alter {
            schema,
            previous,
            cascade,
        } => {
            let statements = commands::ddl::alter(
                registry,
                *dialect,
                &schema,
                &previous,
                cascade || config.ddl.cascade,
            )?;
            print!("{}", commands::ddl::script(&statements));
        }

        Command::Filter { schema, filter } => {
            let filter = commands::query::parse_filter(&filter)?;
            print!(
                "{}",
                commands::query::filter(registry, *dialect, &schema, &filter)?
            );
        }

        Command::Select {
            schema,
            filter,
            details,
            fields,
            sort_key,
            sort_order,
            limit,
            offset,
            for_update,
        } => {
            let filter = commands::query::parse_filter(&filter)?;
            let mut paginator = Paginator::builder();
            if let Some(key) = sort_key {
                paginator = paginator.key(key);
            }
            if let Some(order) = sort_order {
                paginator = paginator.order(order);
            }
            if let Some(limit) = limit {
                paginator = paginator.limit(limit);
            }
            if let Some(offset) = offset {
                paginator = paginator.offset(offset);
            }
            let options = commands::query::SelectOptions {
                details,
                fields,
                paginator: paginator.build()?,
                lock: if for_update {
                    LockPolicy::Exclusive
                } else {
                    LockPolicy::NoLock
                },
            };
            print!(
                "{}",
                commands::query::select(registry, *dialect, &schema, &filter, &options)?
            );
        }
    }

    Ok(())
}
