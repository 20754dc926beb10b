use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tmplgen_core::{Config, SourceText};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tmplgen")]
#[command(about = "Instantiates Rust template modules with concrete types and names.", long_about = None)]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace). RUST_LOG overrides it.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Instantiate one template unit.
    Instantiate {
        /// Template `.rs` file or directory of `.rs` files.
        #[arg(long)]
        from: PathBuf,
        /// Placeholder binding `NAME=VALUE`; repeatable.
        #[arg(long = "param")]
        params: Vec<String>,
        /// Rename `OLD=NEW`; repeatable or comma-separated.
        #[arg(long = "rename", value_delimiter = ',')]
        renames: Vec<String>,
        /// Keep only these symbols and their dependencies (`Name` or `Type.Method`).
        #[arg(long = "use", value_delimiter = ',')]
        uses: Vec<String>,
        /// Module name for a complete output unit; inferred from --output when omitted.
        #[arg(long)]
        module: Option<String>,
        /// Output file. An existing file is merged with the new output.
        #[arg(long)]
        output: Option<PathBuf>,
        /// If set, fail if output differs; do not write.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Run every job of a manifest.
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        /// If set, fail if any output differs; do not write.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Print the diagnostics catalog as Markdown.
    Diagnostics,
}

fn main() -> Result<()> {
    try_main().map_err(|err| {
        eprintln!("{err:#}");
        err
    })
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Instantiate {
            from,
            params,
            renames,
            uses,
            module,
            output,
            check,
        } => {
            let config = Config {
                from,
                params: parse_pairs("parameterize", &params)?,
                renames: parse_pairs("rename", &renames)?,
                existing: Vec::new(),
                uses,
                module,
                output_path: output,
            };
            run_job(config, check)
        }
        Command::Batch { manifest, check } => run_batch(&manifest, check),
        Command::Diagnostics => {
            print!("{}", tmplgen_core::render_diagnostics_md());
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_pairs(kind: &str, pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                out.insert(name.to_string(), value.to_string());
            }
            _ => anyhow::bail!("invalid {kind} spec: {pair}"),
        }
    }
    Ok(out)
}

fn run_job(mut config: Config, check: bool) -> Result<()> {
    let Some(out_path) = config.output_path.clone() else {
        if check {
            anyhow::bail!("--check needs an output path");
        }
        let stdout = std::io::stdout();
        return tmplgen_core::instantiate(&config, &mut stdout.lock());
    };

    let current = match std::fs::read_to_string(&out_path) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("read existing output: {}", out_path.display()))
        }
    };
    if let Some(text) = &current {
        config.existing.push(SourceText {
            name: out_path.display().to_string(),
            text: text.clone(),
        });
    }
    let generated = tmplgen_core::instantiate_to_string(&config)?;

    if current.as_deref() == Some(generated.as_str()) {
        debug!(path = %out_path.display(), "output unchanged");
        return Ok(());
    }
    if check {
        anyhow::bail!("generated output differs: {}", out_path.display());
    }
    std::fs::write(&out_path, generated.as_bytes())
        .with_context(|| format!("write output: {}", out_path.display()))?;
    info!(path = %out_path.display(), "wrote output");
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct Manifest {
    schema_version: String,
    jobs: Vec<Config>,
}

fn run_batch(manifest_path: &Path, check: bool) -> Result<()> {
    let bytes = std::fs::read(manifest_path)
        .with_context(|| format!("read manifest: {}", manifest_path.display()))?;
    let m: Manifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse manifest JSON: {}", manifest_path.display()))?;
    if m.schema_version.trim() != "tmplgen.manifest@0.1.0" {
        anyhow::bail!(
            "manifest schema_version mismatch: expected tmplgen.manifest@0.1.0 got {:?}",
            m.schema_version
        );
    }

    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    for (idx, mut job) in m.jobs.into_iter().enumerate() {
        let Some(output) = job.output_path.take() else {
            anyhow::bail!("manifest job[{idx}] has no output_path");
        };
        job.output_path = Some(base.join(output));
        job.from = base.join(&job.from);
        run_job(job, check).with_context(|| format!("manifest job[{idx}]"))?;
    }
    Ok(())
}
