//! cfload CLI - Load new elementary flows and characterization factors from CSV
//!
//! # Main Commands
//!
//! ```bash
//! cfload load new_flows.csv --method "ReCiPe 2016::ecotoxicity"   # Write flows and factors
//! cfload serve                                                   # Start HTTP server (port 3000)
//! cfload store list                                              # Inspect the local store
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! cfload flows new_flows.csv       # Parse flows to JSON
//! cfload factors new_flows.csv     # Parse characterization entries to JSON
//! cfload validate new_flows.csv    # Parse and validate without writing
//! cfload id -d db -n Zinc -c soil  # Print a flow identifier
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use cfload::api::format_delimiter;
use cfload::{
    derive_flow_id, load_csv, parse_factors, parse_flows, validate_factors, validate_flows,
    ColumnConfig, CsvSource, DuplicatePolicy, LoadOptions, LocalStore, MethodName, RemoteSink,
    RowPolicy, Settings,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "cfload")]
#[command(about = "Load new elementary flows and characterization factors from CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that reads a CSV file.
#[derive(clap::Args)]
struct CsvArgs {
    /// Input CSV file
    input: PathBuf,

    /// Column configuration JSON file (default: CFLOAD_COLUMNS or built-in names)
    #[arg(long)]
    columns: Option<PathBuf>,

    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Leave out invalid rows and report them instead of failing
    #[arg(long)]
    skip_invalid: bool,
}

impl CsvArgs {
    fn policy(&self) -> RowPolicy {
        if self.skip_invalid {
            RowPolicy::Skip
        } else {
            RowPolicy::Abort
        }
    }

    fn column_config(&self, settings: &Settings) -> Result<ColumnConfig, Box<dyn std::error::Error>> {
        let mut columns = match &self.columns {
            Some(path) => ColumnConfig::from_file(path)?,
            None => settings.columns()?,
        };
        if self.delimiter.is_some() {
            columns.delimiter = self.delimiter;
        }
        columns.check()?;
        Ok(columns)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse flows from a CSV file and output JSON
    Flows {
        #[command(flatten)]
        csv: CsvArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse characterization entries from a CSV file and output JSON
    Factors {
        #[command(flatten)]
        csv: CsvArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the identifier derived for a flow
    Id {
        #[arg(short, long)]
        database: String,

        #[arg(short, long)]
        name: String,

        /// Category path, segments separated by "::"
        #[arg(short, long)]
        categories: String,
    },

    /// Parse and validate a CSV file without writing anything
    Validate {
        #[command(flatten)]
        csv: CsvArgs,
    },

    /// Full pipeline: parse, validate and write flows and factors
    Load {
        #[command(flatten)]
        csv: CsvArgs,

        /// Separate CSV file with the characterization factors
        #[arg(long)]
        factors: Option<PathBuf>,

        /// Method receiving the factors, segments separated by "::"
        #[arg(short, long)]
        method: Option<String>,

        /// Unit recorded on the method
        #[arg(long)]
        unit: Option<String>,

        /// What to do when a flow already has a factor in the method
        #[arg(long, value_enum, default_value_t = DuplicateArg::Reject)]
        duplicates: DuplicateArg,

        /// Skip schema validation
        #[arg(long)]
        no_validate: bool,

        /// Parse, validate and merge without writing
        #[arg(long)]
        dry_run: bool,

        /// Local store directory (default: CFLOAD_STORE_DIR or .cfload)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Remote service URL; overrides the local store
        #[arg(long)]
        remote: Option<String>,

        /// Output file for the load report (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect the local store
    Store {
        /// Local store directory (default: CFLOAD_STORE_DIR or .cfload)
        #[arg(long)]
        store: Option<PathBuf>,

        #[command(subcommand)]
        action: StoreAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: CFLOAD_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Column configuration JSON file
        #[arg(long)]
        columns: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// List stored databases and methods
    List,

    /// Print a stored database as JSON
    ShowDatabase {
        name: String,
    },

    /// Print a stored method as JSON
    ShowMethod {
        /// Method name, segments separated by "::"
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DuplicateArg {
    Reject,
    Replace,
    KeepAll,
}

impl From<DuplicateArg> for DuplicatePolicy {
    fn from(arg: DuplicateArg) -> Self {
        match arg {
            DuplicateArg::Reject => DuplicatePolicy::Reject,
            DuplicateArg::Replace => DuplicatePolicy::Replace,
            DuplicateArg::KeepAll => DuplicatePolicy::KeepAll,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Loads .env (if present) before reading CFLOAD_* variables
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Flows { csv, output } => cmd_flows(&csv, &settings, output.as_deref()),

        Commands::Factors { csv, output } => cmd_factors(&csv, &settings, output.as_deref()),

        Commands::Id {
            database,
            name,
            categories,
        } => cmd_id(&database, &name, &categories),

        Commands::Validate { csv } => cmd_validate(&csv, &settings),

        Commands::Load {
            csv,
            factors,
            method,
            unit,
            duplicates,
            no_validate,
            dry_run,
            store,
            remote,
            output,
        } => {
            let columns = match csv.column_config(&settings) {
                Ok(columns) => columns,
                Err(e) => {
                    eprintln!("❌ Error: {e}");
                    std::process::exit(1);
                }
            };
            let method = match method_arg(method.as_deref()) {
                Ok(method) => method,
                Err(e) => {
                    eprintln!("❌ Error: {e}");
                    std::process::exit(1);
                }
            };
            let options = LoadOptions {
                input: csv.input.clone(),
                factors,
                method,
                method_unit: unit,
                columns,
                row_policy: csv.policy(),
                duplicates: duplicates.into(),
                skip_validation: no_validate,
                dry_run,
            };
            cmd_load(options, &settings, store, remote, output.as_deref()).await
        }

        Commands::Store { store, action } => cmd_store(store.unwrap_or(settings.store_dir.clone()), action),

        Commands::Serve { port, columns } => cmd_serve(&settings, port, columns.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `cfload=info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cfload=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn describe_source(source: &CsvSource, explicit_delimiter: bool) {
    eprintln!("   Encoding: {}", source.encoding());
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(source.delimiter()),
        if explicit_delimiter { "" } else { " (auto-detected)" }
    );
    eprintln!("   Columns: {}", source.header().names().join(", "));
}

fn cmd_flows(csv: &CsvArgs, settings: &Settings, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Parsing flows: {}", csv.input.display());
    let columns = csv.column_config(settings)?;
    describe_source(&CsvSource::open(&csv.input, columns.delimiter)?, csv.delimiter.is_some());

    let parsed = parse_flows(&csv.input, &columns, csv.policy())?;
    report_rejected(&parsed.rejected);
    eprintln!("✅ Parsed {} flows from {} rows", parsed.records.len(), parsed.rows_read);

    write_output(&serde_json::to_string_pretty(&parsed.records)?, output)
}

fn cmd_factors(csv: &CsvArgs, settings: &Settings, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Parsing factors: {}", csv.input.display());
    let columns = csv.column_config(settings)?;
    describe_source(&CsvSource::open(&csv.input, columns.delimiter)?, csv.delimiter.is_some());

    let parsed = parse_factors(&csv.input, &columns, csv.policy())?;
    report_rejected(&parsed.rejected);
    eprintln!("✅ Parsed {} factors from {} rows", parsed.records.len(), parsed.rows_read);

    write_output(&serde_json::to_string_pretty(&parsed.records)?, output)
}

fn cmd_id(database: &str, name: &str, categories: &str) -> CliResult {
    let segments = category_segments(categories)?;
    println!("{}", derive_flow_id(database, name, &segments));
    Ok(())
}

/// Segments of a `::` separated category path; an empty path matches no flow.
fn category_segments(categories: &str) -> Result<Vec<&str>, String> {
    let segments: Vec<&str> = categories
        .split("::")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(format!("Invalid category path: '{categories}'"));
    }
    Ok(segments)
}

/// A `--method` value that is given must name a method.
fn method_arg(method: Option<&str>) -> Result<Option<MethodName>, String> {
    method
        .map(|m| MethodName::parse(m, "::").ok_or_else(|| format!("Invalid method name: '{m}'")))
        .transpose()
}

fn cmd_validate(csv: &CsvArgs, settings: &Settings) -> CliResult {
    eprintln!("✔️  Validating: {}", csv.input.display());
    let columns = csv.column_config(settings)?;

    let flows = parse_flows(&csv.input, &columns, csv.policy())?;
    report_rejected(&flows.rejected);
    let mut invalid = report_invalid("Flow", &validate_flows(&flows.records));

    let source = CsvSource::open(&csv.input, columns.delimiter)?;
    let factor_count = if source.header().position(&columns.factor).is_some() {
        let factors = parse_factors(&csv.input, &columns, csv.policy())?;
        invalid += report_invalid("Factor", &validate_factors(&factors.records));
        factors.records.len()
    } else {
        0
    };

    eprintln!(
        "\n📊 Results: {} flows, {} factors, {} invalid, {} rows skipped",
        flows.records.len(),
        factor_count,
        invalid,
        flows.rejected.len()
    );

    if invalid > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_load(
    options: LoadOptions,
    settings: &Settings,
    store: Option<PathBuf>,
    remote: Option<String>,
    output: Option<&Path>,
) -> CliResult {
    eprintln!("📄 Loading: {}", options.input.display());

    let remote_sink = match remote {
        Some(url) => Some(match &settings.remote_token {
            Some(token) => RemoteSink::new(url).with_token(token),
            None => RemoteSink::new(url),
        }),
        None => RemoteSink::from_settings(settings),
    };

    let report = match remote_sink {
        Some(mut sink) => {
            eprintln!("   Target: {}", sink.base_url());
            load_csv(&options, &mut sink).await?
        }
        None => {
            let mut sink = LocalStore::new(store.unwrap_or(settings.store_dir.clone()));
            eprintln!("   Target: {}", sink.root().display());
            load_csv(&options, &mut sink).await?
        }
    };

    for database in &report.databases {
        eprintln!("   📦 {}: {} flows", database.name, database.flows);
    }
    if let Some(method) = &report.method {
        eprintln!("   📐 {method}: {} factors ({} new)", report.method_size, report.factors_written);
    }
    if report.dry_run {
        eprintln!("   (dry run, nothing written)");
    }

    write_output(&serde_json::to_string_pretty(&report)?, output)?;
    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_store(dir: PathBuf, action: StoreAction) -> CliResult {
    let store = LocalStore::new(dir);

    match action {
        StoreAction::List => {
            let databases = store.databases()?;
            let methods = store.methods()?;
            if databases.is_empty() && methods.is_empty() {
                eprintln!("📋 Store {} is empty.", store.root().display());
                return Ok(());
            }

            eprintln!("📋 Databases ({}):", databases.len());
            for db in &databases {
                println!("  📦 {} - {} flows (modified {})", db.name, db.flows.len(), db.modified_at);
            }
            eprintln!("\n📋 Methods ({}):", methods.len());
            for m in &methods {
                println!(
                    "  📐 {} - {} factors{} (modified {})",
                    m.name,
                    m.factors.len(),
                    m.unit.as_deref().map(|u| format!(", {u}")).unwrap_or_default(),
                    m.modified_at
                );
            }
        }

        StoreAction::ShowDatabase { name } => {
            let db = store.database(&name)?;
            println!("{}", serde_json::to_string_pretty(&db)?);
        }

        StoreAction::ShowMethod { name } => {
            let method = MethodName::parse(&name, "::")
                .ok_or_else(|| format!("Invalid method name: '{name}'"))?;
            println!("{}", serde_json::to_string_pretty(&store.method(&method)?)?);
        }
    }

    Ok(())
}

async fn cmd_serve(settings: &Settings, port: Option<u16>, columns: Option<&Path>) -> CliResult {
    let columns = match columns {
        Some(path) => ColumnConfig::from_file(path)?,
        None => settings.columns()?,
    };
    columns.check()?;
    cfload::server::start_server(port.unwrap_or(settings.port), columns).await?;
    Ok(())
}

fn report_rejected(rejected: &[cfload::RowError]) {
    if rejected.is_empty() {
        return;
    }
    eprintln!("   ⚠️  {} rows skipped:", rejected.len());
    for error in rejected.iter().take(5) {
        eprintln!("     - {error}");
    }
}

fn report_invalid(what: &str, errors: &[(usize, Vec<String>)]) -> usize {
    for (i, messages) in errors.iter().take(5) {
        eprintln!("\n❌ {what} {i} invalid:");
        for message in messages.iter().take(3) {
            eprintln!("   - {message}");
        }
    }
    errors.len()
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{content}");
        }
    }
    Ok(())
}
