//! geoip-mmdb: CLI tool for compiling IP prefix lists into MaxMind DB files.

use clap::{Parser, Subcommand};
use geoip_mmdb::{Config, InputFormat, Instance, MmdbReader, OutputFormat};
use serde_json::{json, Map, Value};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "geoip-mmdb")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Compile IP prefix lists into MaxMind DB country databases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all available input and output formats
    List,

    /// Run the conversions described by a config file
    Run {
        /// Path to the config file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Convert a single input without a config file
    Convert {
        /// Input format (e.g. text)
        #[arg(long)]
        input: String,

        /// Input file path or URL
        #[arg(long)]
        input_file: String,

        /// Label of the input entry (defaults to the file stem)
        #[arg(long)]
        input_name: Option<String>,

        /// Output format (e.g. maxmindMMDB)
        #[arg(long, default_value = "maxmindMMDB")]
        output: String,

        /// Output file (*.mmdb) or directory
        #[arg(long)]
        output_file: Option<PathBuf>,

        /// Comma separated list of wanted labels (e.g. CN,US,JP)
        #[arg(long, value_delimiter = ',')]
        want_list: Vec<String>,

        /// Only process one address family: ipv4 or ipv6
        #[arg(long)]
        only_ip_type: Option<String>,

        /// Write one file per label
        #[arg(long)]
        one_file_per_list: bool,
    },

    /// Look up addresses in a database
    Lookup {
        /// Database file
        #[arg(short, long)]
        db: PathBuf,

        /// Addresses to look up
        #[arg(required = true)]
        ips: Vec<IpAddr>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List => {
            list_formats();
            Ok(())
        }
        Commands::Run { config } => run_config(&config),
        Commands::Convert {
            input,
            input_file,
            input_name,
            output,
            output_file,
            want_list,
            only_ip_type,
            one_file_per_list,
        } => {
            let request = ConvertRequest {
                input,
                input_file,
                input_name,
                output,
                output_file,
                want_list,
                only_ip_type,
                one_file_per_list,
            };
            convert(&request)
        }
        Commands::Lookup { db, ips } => lookup(&db, &ips),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn list_formats() {
    println!("All available input formats:");
    for format in InputFormat::ALL {
        println!("  - {} ({})", format.type_name(), format.description());
    }
    println!();
    println!("All available output formats:");
    for format in OutputFormat::ALL {
        println!("  - {} ({})", format.type_name(), format.description());
    }
}

fn run_config(path: &Path) -> geoip_mmdb::Result<()> {
    let instance = Instance::from_file(path)?;
    instance.run()?;
    Ok(())
}

struct ConvertRequest {
    input: String,
    input_file: String,
    input_name: Option<String>,
    output: String,
    output_file: Option<PathBuf>,
    want_list: Vec<String>,
    only_ip_type: Option<String>,
    one_file_per_list: bool,
}

fn convert(request: &ConvertRequest) -> geoip_mmdb::Result<()> {
    let config = convert_config(request)?;
    let instance = Instance::new(&config)?;

    println!(
        "Converting from {} ({}) to {} format...",
        request.input, request.input_file, request.output
    );
    let paths = instance.run()?;
    for path in &paths {
        log::debug!("Wrote {}", path.display());
    }
    println!("Conversion completed successfully!");
    Ok(())
}

/// Build the single-input, single-output configuration of a `convert` call.
fn convert_config(request: &ConvertRequest) -> geoip_mmdb::Result<Config> {
    let mut input_args = Map::new();
    let name = match &request.input_name {
        Some(name) => name.clone(),
        None => file_stem(&request.input_file),
    };
    input_args.insert("name".into(), json!(name));
    input_args.insert("uri".into(), json!(request.input_file));

    let mut output_args = Map::new();
    if let Some(output_file) = &request.output_file {
        let is_file = output_file
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("mmdb"))
            .unwrap_or(false);
        if is_file {
            if let Some(name) = output_file.file_name() {
                output_args.insert("outputName".into(), json!(name.to_string_lossy()));
            }
            if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                output_args.insert("outputDir".into(), json!(parent));
            }
        } else {
            output_args.insert("outputDir".into(), json!(output_file));
        }
    }
    if !request.want_list.is_empty() {
        output_args.insert("wantedList".into(), json!(request.want_list));
    }
    if request.one_file_per_list {
        output_args.insert("oneFilePerList".into(), json!(true));
    }
    if let Some(ip_type) = &request.only_ip_type {
        input_args.insert("onlyIPType".into(), json!(ip_type));
        output_args.insert("onlyIPType".into(), json!(ip_type));
    }

    let config = json!({
        "input": [{ "type": request.input, "action": "add", "args": Value::Object(input_args) }],
        "output": [{ "type": request.output, "action": "output", "args": Value::Object(output_args) }],
    });
    Ok(serde_json::from_value(config)?)
}

/// `dir/cn.txt.gz` -> `cn`; URLs use their last path segment.
fn file_stem(uri: &str) -> String {
    let base = uri.rsplit('/').next().unwrap_or(uri);
    let base = base.strip_suffix(".gz").unwrap_or(base);
    Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| base.to_string())
}

fn lookup(db: &Path, ips: &[IpAddr]) -> geoip_mmdb::Result<()> {
    let reader = MmdbReader::open(db)?;
    for ip in ips {
        match reader.lookup_label(*ip)? {
            Some(label) => println!("{} {}", ip, label),
            None => println!("{} not found", ip),
        }
    }
    Ok(())
}
