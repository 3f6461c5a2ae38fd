use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use xavro_avro::{Encoder, Schema};

#[derive(Parser)]
#[command(name = "xavro", about = "Schema-driven XML to Avro conversion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an XML document into an Avro object container file
    Convert(Convert),
    /// Parse an XML document and dump its intermediate tree
    Inspect(Inspect),
}

#[derive(Args)]
struct Convert {
    /// Path to the XML document
    xml: PathBuf,
    /// Path to the Avro schema (.avsc)
    #[arg(short, long)]
    schema: PathBuf,
    /// Output path for the container file
    #[arg(short, long)]
    out: PathBuf,
}

#[derive(Args)]
struct Inspect {
    /// Path to the XML document
    xml: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert(args) => convert(args),
        Commands::Inspect(args) => inspect(args),
    }
}

fn convert(args: Convert) -> anyhow::Result<()> {
    let schema_text = read(&args.schema)?;
    let schema = Schema::parse_str(&schema_text)
        .with_context(|| format!("parsing schema {}", args.schema.display()))?;

    let xml = read(&args.xml)?;
    let tree = xavro_xml::parse(&xml)
        .with_context(|| format!("parsing {}", args.xml.display()))?;

    let mut encoder = Encoder::new(&schema);
    let value = encoder.encode(&tree)?;
    let avro = xavro_avro::to_vec(&value, &schema)?;
    fs::write(&args.out, avro).with_context(|| format!("writing {}", args.out.display()))?;

    let diagnostics = encoder.diagnostics();
    if !diagnostics.is_clean() {
        eprintln!(
            "warning: {} field(s) without a schema slot dropped, {} value(s) lost to unsupported coercions",
            diagnostics.unschematized_fields, diagnostics.unsupported_coercions
        );
    }
    Ok(())
}

fn inspect(args: Inspect) -> anyhow::Result<()> {
    let xml = read(&args.xml)?;
    let tree = xavro_xml::parse(&xml)
        .with_context(|| format!("parsing {}", args.xml.display()))?;
    print!("{tree}");
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
