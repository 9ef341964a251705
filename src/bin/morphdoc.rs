//! morphdoc CLI - run document transformation scripts from the command line

use clap::{Parser, Subcommand};
use morphdoc::{Content, Document, FormatRegistry, Header, MediaType, RuntimeConfig, TransformerBuilder};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "morphdoc")]
#[command(version, about = "Script-driven document transformation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script over an input document and print the result
    Transform {
        /// Script file, optionally starting with a `/** morphdoc` header
        #[arg(short, long)]
        script: PathBuf,

        /// Input document (reads stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Media type of the input; defers to the header when omitted
        #[arg(long)]
        input_type: Option<String>,

        /// Output media type, overriding the header
        #[arg(short, long)]
        output_type: Option<String>,

        /// Parameter document as name=<file>[:<mediatype>], repeatable
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// YAML runtime configuration (defaults to MORPHDOC_* variables)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the parsed script header as JSON
    Header {
        #[arg(short, long)]
        script: PathBuf,
    },

    /// List the default data formats in negotiation order
    Formats,
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Transform {
            script,
            input,
            input_type,
            output_type,
            params,
            config,
        } => transform(script, input, input_type, output_type, params, config),
        Commands::Header { script } => print_header(script),
        Commands::Formats => list_formats(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn transform(
    script: PathBuf,
    input: Option<PathBuf>,
    input_type: Option<String>,
    output_type: Option<String>,
    params: Vec<String>,
    config: Option<PathBuf>,
) -> Result<(), String> {
    let config = match config {
        Some(path) => RuntimeConfig::load_from_file(path).map_err(|e| e.to_string())?,
        None => RuntimeConfig::from_env(),
    };

    let transformer = TransformerBuilder::new(read_file(&script)?)
        .with_config(config)
        .build()
        .map_err(|e| e.to_string())?;

    let content = match input {
        Some(path) => read_file(&path)?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            text
        }
    };
    let input = Document::new(content, parse_media_type(input_type.as_deref())?);

    let mut documents = HashMap::new();
    for param in &params {
        let (name, document) = parse_param(param)?;
        documents.insert(name, document);
    }

    let output_type = output_type
        .as_deref()
        .map(|text| MediaType::parse(text).map_err(|e| e.to_string()))
        .transpose()?;

    let output = transformer
        .transform_with(&input, &documents, output_type.as_ref())
        .map_err(|e| e.to_string())?;

    tracing::debug!(media_type = %output.media_type(), "transform complete");
    write_content(output.content())
}

fn print_header(script: PathBuf) -> Result<(), String> {
    let header = Header::parse(&read_file(&script)?).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&header).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn list_formats() -> Result<(), String> {
    let join = |types: &[MediaType]| {
        types
            .iter()
            .map(MediaType::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    for format in FormatRegistry::default().formats() {
        println!("{}", format.name());
        println!("  reads:  {}", join(format.readable_types()));
        println!("  writes: {}", join(format.writable_types()));
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

fn parse_media_type(text: Option<&str>) -> Result<MediaType, String> {
    match text {
        Some(text) => MediaType::parse(text).map_err(|e| format!("Invalid media type '{}': {}", text, e)),
        None => Ok(MediaType::any()),
    }
}

/// Parse `name=<file>[:<mediatype>]` into a named document.
fn parse_param(param: &str) -> Result<(String, Document), String> {
    let (name, source) = param
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{}': expected name=<file>[:<mediatype>]", param))?;

    let (path, media_type) = match source.split_once(':') {
        Some((path, media_type)) => (path, Some(media_type)),
        None => (source, None),
    };

    let content = read_file(Path::new(path))?;
    Ok((name.to_string(), Document::new(content, parse_media_type(media_type)?)))
}

fn write_content(content: &Content) -> Result<(), String> {
    let mut stdout = io::stdout().lock();
    let result = match content {
        Content::Empty => Ok(()),
        Content::Text(text) if text.ends_with('\n') => stdout.write_all(text.as_bytes()),
        Content::Text(text) => writeln!(stdout, "{}", text),
        Content::Binary(bytes) => stdout.write_all(bytes),
        Content::Value(value) => writeln!(stdout, "{}", value),
    };
    result.map_err(|e| format!("Failed to write output: {}", e))
}
