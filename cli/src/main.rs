//! sheetbind CLI - schema-driven Excel reading and writing
//!
//! A command-line tool for inspecting workbooks, decoding sheets into JSON
//! records, and converting sheets between workbooks.

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use sheetbind::{CellCoord, DynamicRecord, SchemaDocument, SheetSelector};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Schema-driven Excel reading and writing
#[derive(Parser)]
#[command(
    name = "sheetbind",
    author = "iyulab",
    version,
    about = "Read and write Excel sheets through declared schemas",
    long_about = "sheetbind - Schema-driven binding of Excel worksheets to records.\n\n\
                  Reads XLSX and XLS workbooks, writes XLSX."
)]
struct Cli {
    /// Log library activity to stderr (filter with RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show workbook information
    Info {
        /// Input file path
        input: PathBuf,
    },

    /// Decode a sheet into JSON records
    Read {
        /// Input file path
        input: PathBuf,

        /// Schema document (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Sheet name or zero-based index
        #[arg(long, default_value = "0")]
        sheet: String,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output compact JSON (no indentation)
        #[arg(long)]
        compact: bool,
    },

    /// Print individual cell values
    Cells {
        /// Input file path
        input: PathBuf,

        /// Cell references such as `B2` or `Sheet1!B2`
        #[arg(required = true)]
        references: Vec<String>,
    },

    /// Decode a sheet and write it to a new XLSX workbook
    Convert {
        /// Input file path
        input: PathBuf,

        /// Output XLSX path
        output: PathBuf,

        /// Schema document (JSON) used for reading and writing
        #[arg(short, long)]
        schema: PathBuf,

        /// Sheet name or zero-based index
        #[arg(long, default_value = "0")]
        sheet: String,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        init_logging();
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sheetbind=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => {
            let pb = create_spinner("Opening workbook...");

            let workbook = sheetbind::open_workbook(&input)?;
            let names = workbook.sheet_names();

            pb.finish_and_clear();

            println!("{}", "Workbook Information".cyan().bold());
            println!("{}", "─".repeat(40));
            println!(
                "{}: {}",
                "File".bold(),
                input.file_name().unwrap_or_default().to_string_lossy()
            );
            println!("{}: {}", "Format".bold(), workbook.format().name());
            println!("{}: {}", "Sheets".bold(), names.len());
            for (idx, name) in names.iter().enumerate() {
                println!("  {} {}", format!("{:>3}", idx).dimmed(), name);
            }
        }

        Commands::Read {
            input,
            schema,
            sheet,
            output,
            compact,
        } => {
            let pb = create_spinner("Loading schema...");
            let binding = SchemaDocument::load(&schema)?.binding()?;

            pb.set_message("Reading sheet...");
            let mut workbook = sheetbind::open_workbook(&input)?;
            let records: Vec<DynamicRecord> =
                binding.read_all(workbook.as_mut(), parse_sheet(&sheet))?;

            pb.set_message("Rendering to JSON...");
            let json = if compact {
                serde_json::to_string(&records)?
            } else {
                serde_json::to_string_pretty(&records)?
            };

            pb.finish_and_clear();
            write_output(output.as_deref(), &json)?;

            if let Some(path) = output {
                println!(
                    "{} Read {} records to {}",
                    "✓".green().bold(),
                    records.len(),
                    path.display()
                );
            }
        }

        Commands::Cells { input, references } => {
            let coords = references
                .iter()
                .map(|r| parse_coord(r))
                .collect::<Result<Vec<_>, _>>()?;

            let pb = create_spinner("Reading cells...");
            let mut workbook = sheetbind::open_workbook(&input)?;
            let values = workbook.read_cells(&coords)?;
            pb.finish_and_clear();

            for (reference, value) in references.iter().zip(values) {
                match value {
                    Some(value) => println!("{}: {}", reference.bold(), value),
                    None => println!("{}: {}", reference.bold(), "(empty)".dimmed()),
                }
            }
        }

        Commands::Convert {
            input,
            output,
            schema,
            sheet,
        } => {
            let pb = create_spinner("Loading schema...");
            let binding = SchemaDocument::load(&schema)?.binding()?;

            pb.set_message("Reading sheet...");
            let mut workbook = sheetbind::open_workbook(&input)?;
            let records: Vec<DynamicRecord> =
                binding.read_all(workbook.as_mut(), parse_sheet(&sheet))?;

            pb.set_message("Writing workbook...");
            let mut rows = 0;
            sheetbind::write_xlsx(&output, |writer| {
                rows = binding.write_to(writer, &records)?.rows;
                Ok(())
            })?;

            pb.finish_and_clear();
            println!(
                "{} Converted {} records ({} rows) to {}",
                "✓".green().bold(),
                records.len(),
                rows,
                output.display()
            );
        }

        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

/// A sheet argument is an index when it parses as one.
fn parse_sheet(sheet: &str) -> SheetSelector {
    match sheet.parse::<usize>() {
        Ok(idx) => SheetSelector::Index(idx),
        Err(_) => SheetSelector::Name(sheet.to_string()),
    }
}

fn parse_coord(reference: &str) -> Result<CellCoord, String> {
    let (sheet, cell) = match reference.rsplit_once('!') {
        Some((sheet, cell)) => (parse_sheet(sheet.trim_matches('\'')), cell),
        None => (SheetSelector::Index(0), reference),
    };
    let (column, row) = sheetbind::split_cell_reference(&cell.to_ascii_uppercase())
        .ok_or_else(|| format!("invalid cell reference '{}'", reference))?;
    Ok(CellCoord::new(sheet, row, column))
}

fn print_version() {
    println!("{} {}", "sheetbind".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("Schema-driven binding of Excel worksheets to typed records");
    println!();
    println!("Read formats: XLSX, XLS");
    println!("Write formats: XLSX");
    println!("Repository: https://github.com/iyulab/sheetbind");
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn write_output(path: Option<&Path>, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{}", content)?;
        }
    }
    Ok(())
}
