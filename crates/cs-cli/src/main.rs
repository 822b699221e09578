//! CodeSystem sync CLI
//!
//! Command-line tool for updating, inspecting and formatting FSH CodeSystems.

use clap::{Parser, Subcommand, ValueEnum};
use cs_core::{
    load_table, parse_code_system, parse_file, reconcile, to_fsh, write_fsh, MergeConfig,
    ParseOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "cs-cli")]
#[command(about = "Keep FSH CodeSystems in sync with tabular data", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a table into a CodeSystem and save the result
    Update {
        /// FSH file holding the CodeSystem
        #[arg(short, long)]
        fsh: PathBuf,

        /// Table with the authoritative codes (.csv or .tsv)
        #[arg(short, long)]
        data: PathBuf,

        /// Merge configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Additional metadata field to keep (repeatable)
        #[arg(long = "extra-field")]
        extra_field: Vec<String>,
    },

    /// Show a parsed CodeSystem
    Show {
        /// FSH file holding the CodeSystem
        #[arg(short, long)]
        fsh: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: ShowFormat,
    },

    /// Rewrite a CodeSystem in canonical form
    Format {
        /// FSH file holding the CodeSystem
        #[arg(short, long)]
        fsh: PathBuf,

        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only report whether the file is canonical
        #[arg(long)]
        check: bool,
    },

    /// Create a merge configuration template
    InitConfig {
        /// Output path for the configuration file
        #[arg(short, long)]
        output: PathBuf,

        /// Column holding the code values
        #[arg(long, default_value = "code")]
        code_column: String,

        /// Column holding the displays
        #[arg(long, default_value = "display")]
        display_column: String,

        /// Property mappings to include (property:column)
        #[arg(short, long)]
        map: Vec<String>,
    },

    /// Parse every CodeSystem under the given directories
    Check {
        /// Root directories to scan
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cs_core={level},cs_cli={level}").into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands) -> cs_core::Result<()> {
    match command {
        Commands::Update {
            fsh,
            data,
            config,
            output,
            extra_field,
        } => cmd_update(&fsh, &data, &config, output.as_deref(), extra_field),
        Commands::Show { fsh, format } => cmd_show(&fsh, format),
        Commands::Format { fsh, output, check } => cmd_format(&fsh, output.as_deref(), check),
        Commands::InitConfig {
            output,
            code_column,
            display_column,
            map,
        } => cmd_init_config(&output, code_column, display_column, &map),
        Commands::Check { root } => cmd_check(&root),
    }
}

fn parse_options(extra_fields: Vec<String>) -> ParseOptions {
    extra_fields
        .into_iter()
        .fold(ParseOptions::default(), |options, field| {
            options.with_extra_field(field)
        })
}

fn cmd_update(
    fsh: &Path,
    data: &Path,
    config_path: &Path,
    output: Option<&Path>,
    extra_fields: Vec<String>,
) -> cs_core::Result<()> {
    // Everything is loaded before anything is written
    let config = MergeConfig::load(config_path)?;
    let table = load_table(data)?;
    let parsed = parse_file(fsh, &parse_options(extra_fields))?;
    let destination = output.unwrap_or(fsh);
    if same_file(destination, fsh) {
        parsed.ensure_rewritable(fsh)?;
    }

    if !parsed.warnings.is_empty() {
        tracing::warn!("{} parse warnings in {}", parsed.warnings.len(), fsh.display());
    }

    let mut code_system = parsed.code_system;
    let report = reconcile(&mut code_system, &table, &config)?;

    for name in code_system.undefined_properties() {
        tracing::warn!("property '{}' has no definition, written as string", name);
    }

    write_fsh(&code_system, destination)?;

    println!("CodeSystem: {}", code_system.name);
    println!("  {} codes added", report.added.len());
    println!("  {} codes updated", report.updated.len());
    println!("  {} codes marked inactive", report.deactivated.len());
    if !report.skipped_rows.is_empty() {
        println!("  {} rows skipped (no code)", report.skipped_rows.len());
    }
    println!("Updated CodeSystem saved to {}", destination.display());

    Ok(())
}

/// Whether two paths name the same file; a destination that does not exist yet is new
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn cmd_show(fsh: &Path, format: ShowFormat) -> cs_core::Result<()> {
    let parsed = parse_file(fsh, &ParseOptions::default())?;
    let cs = &parsed.code_system;

    if let ShowFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(cs)?);
        return Ok(());
    }

    println!("CodeSystem: {}", cs.name);
    println!("Id: {}", cs.id);
    println!("Title: {}", cs.title);
    println!("Status: {}", cs.status);
    println!("Url: {}", cs.url);
    println!("Version: {}", cs.version);
    for (field, value) in &cs.extra {
        println!("{}: {}", field, value);
    }
    println!();

    println!("Properties ({}):", cs.properties.len());
    for def in cs.properties.values() {
        match &def.description {
            Some(description) => println!("  {} [{}] {}", def.code, def.value_type, description),
            None => println!("  {} [{}]", def.code, def.value_type),
        }
    }
    println!();

    let inactive = cs.codes.values().filter(|c| !c.is_active()).count();
    println!("Codes ({}, {} inactive):", cs.code_count(), inactive);
    for code in cs.codes.values() {
        let marker = if code.is_active() { "" } else { " (inactive)" };
        println!("  {}\t{}{}", code.code, code.display, marker);
    }

    if !parsed.warnings.is_empty() {
        println!();
        println!("Warnings ({}):", parsed.warnings.len());
        for warning in &parsed.warnings {
            println!("  {}", warning);
        }
    }

    Ok(())
}

fn cmd_format(fsh: &Path, output: Option<&Path>, check: bool) -> cs_core::Result<()> {
    let content = fs::read_to_string(fsh).map_err(|e| cs_core::Error::FileRead {
        path: fsh.to_path_buf(),
        source: e,
    })?;
    let parsed = parse_code_system(&content, &ParseOptions::default())?;
    let canonical = to_fsh(&parsed.code_system);

    if check {
        if canonical == content {
            println!("{} is canonical", fsh.display());
        } else {
            println!("{} is not canonical", fsh.display());
            std::process::exit(1);
        }
        return Ok(());
    }

    let destination = output.unwrap_or(fsh);
    if same_file(destination, fsh) {
        parsed.ensure_rewritable(fsh)?;
    }
    write_fsh(&parsed.code_system, destination)?;
    println!(
        "Formatted {} codes to {}",
        parsed.code_system.code_count(),
        destination.display()
    );

    Ok(())
}

fn cmd_init_config(
    output: &Path,
    code_column: String,
    display_column: String,
    mappings: &[String],
) -> cs_core::Result<()> {
    let mut config = MergeConfig {
        code_column,
        display_column,
        ..MergeConfig::default()
    };

    // Parse mappings: "property:column"
    for mapping in mappings {
        match mapping.split_once(':') {
            Some((property, column)) if !property.is_empty() && !column.is_empty() => {
                config = config.map_property(property, column);
            }
            _ => eprintln!(
                "Warning: Invalid mapping '{}', expected 'property:column'",
                mapping
            ),
        }
    }

    config.save(output)?;
    println!("Created merge configuration: {}", output.display());
    println!("Property mappings: {}", config.property_mappings.len());
    println!();
    println!("Edit the file to add designation columns, then run:");
    println!(
        "  cs-cli update --fsh <file> --data <table> --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_check(roots: &[PathBuf]) -> cs_core::Result<()> {
    let options = ParseOptions::default();
    let mut checked = 0;
    let mut failed = 0;
    let mut warned = 0;

    for root in roots {
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "fsh") {
                continue;
            }

            let content = fs::read_to_string(path).map_err(|e| cs_core::Error::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;
            if !content.contains("CodeSystem:") {
                tracing::debug!("{}: no CodeSystem, skipped", path.display());
                continue;
            }
            checked += 1;

            match parse_code_system(&content, &options) {
                Ok(parsed) if parsed.warnings.is_empty() => {
                    println!(
                        "{}: ok ({} codes)",
                        path.display(),
                        parsed.code_system.code_count()
                    );
                }
                Ok(parsed) => {
                    warned += 1;
                    println!(
                        "{}: {} warnings ({} codes)",
                        path.display(),
                        parsed.warnings.len(),
                        parsed.code_system.code_count()
                    );
                    for warning in &parsed.warnings {
                        println!("  {}", warning);
                    }
                }
                Err(e) => {
                    failed += 1;
                    println!("{}: {}", path.display(), e);
                }
            }
        }
    }

    println!();
    println!(
        "Checked {} CodeSystems: {} with warnings, {} failed",
        checked, warned, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
