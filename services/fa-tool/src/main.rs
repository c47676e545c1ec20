//! FA file tool.
//!
//! Describes FA files, lists their fields and converts them (one file or a
//! time series of files) to NetCDF.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fa_dataset::{
    describe, save_netcdf, FaConfig, FieldSelection, ImportOptions, Importer, RscriptDecoder,
};

#[derive(Parser, Debug)]
#[command(name = "fa-tool")]
#[command(about = "Inspect FA files and convert them to NetCDF")]
struct Args {
    /// YAML configuration file (default: environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an overview of an FA file
    Describe {
        /// FA file
        file: PathBuf,
    },

    /// List the fields of an FA file
    Fields {
        /// FA file
        file: PathBuf,
    },

    /// Convert FA files to NetCDF, merging several files along validity time
    Convert {
        /// FA files or glob patterns
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output NetCDF file
        #[arg(short, long)]
        output: PathBuf,

        /// Field to import (repeatable, default: all)
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Field to skip (repeatable)
        #[arg(long)]
        blacklist: Vec<String>,

        /// Reproject to this CRS (ex: EPSG:4326)
        #[arg(long)]
        proj: Option<String>,

        /// Stack pseudo-3D levels into one variable per basename
        #[arg(long)]
        consolidate_pseudo_3d: bool,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_tracing(args: &Args) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(parse_level(&args.log_level))
        .with_target(true)
        .with_writer(std::io::stderr);

    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FaConfig> {
    let config = match path {
        Some(path) => FaConfig::from_yaml(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => FaConfig::from_env(),
    };
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;
    Ok(config)
}

/// Expand glob patterns. Plain paths are kept as given; a pattern matching
/// nothing is an error.
fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if !input.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(input));
            continue;
        }
        let mut matched: Vec<PathBuf> = glob::glob(input)
            .with_context(|| format!("invalid pattern {}", input))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        if matched.is_empty() {
            bail!("no files match {}", input);
        }
        matched.sort();
        paths.append(&mut matched);
    }
    Ok(paths)
}

fn selection(fields: &[String], blacklist: &[String]) -> FieldSelection {
    let base = if fields.is_empty() {
        FieldSelection::all()
    } else {
        FieldSelection::only(fields.iter().cloned())
    };
    base.excluding(blacklist.iter().cloned())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config = load_config(args.config.as_deref())?;
    let decoder = RscriptDecoder::from_config(&config)?;
    let importer = Importer::new(&decoder, &config);

    match args.command {
        Command::Describe { file } => {
            let source = importer.open(&file)?;
            print!("{}", describe(&source));
        }
        Command::Fields { file } => {
            let source = importer.open(&file)?;
            println!("{:<24} {:>6} {:>9} {:>6}  class", "name", "index", "spectral", "nbits");
            for record in source.records() {
                let class = source
                    .catalog()
                    .class_of(&record.name)
                    .map(|c| c.label())
                    .unwrap_or("-");
                println!(
                    "{:<24} {:>6} {:>9} {:>6}  {}",
                    record.name,
                    record.index.map(|i| i.to_string()).unwrap_or_default(),
                    record.spectral.map(|s| s.to_string()).unwrap_or_default(),
                    record.nbits.map(|n| n.to_string()).unwrap_or_default(),
                    class
                );
            }
        }
        Command::Convert {
            inputs,
            output,
            fields,
            blacklist,
            proj,
            consolidate_pseudo_3d,
            overwrite,
        } => {
            let paths = expand_inputs(&inputs)?;
            let selection = selection(&fields, &blacklist);
            let mut options = ImportOptions::default();
            if let Some(target) = proj {
                options = options.reproject_to(target);
            }
            if consolidate_pseudo_3d {
                options = options.consolidated();
            }

            info!(files = paths.len(), output = %output.display(), "Converting FA files");
            let dataset = if let [path] = paths.as_slice() {
                let source = importer.open(path)?;
                importer.import(&source, &selection, &options)?
            } else {
                importer
                    .import_files(&paths, &selection, &options)?
                    .into_merged()?
            };

            let written = save_netcdf(&dataset, &output, overwrite)?;
            println!("{}", written.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_expand_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ICMSHAR13+0015", "ICMSHAR13+0014", "other"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let pattern = format!("{}/ICMSHAR13+*", dir.path().display());
        let paths = expand_inputs(&[pattern]).unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("ICMSHAR13+0014"),
                dir.path().join("ICMSHAR13+0015")
            ]
        );

        // Plain paths are not checked here
        let plain = expand_inputs(&["missing-file".to_string()]).unwrap();
        assert_eq!(plain, vec![PathBuf::from("missing-file")]);

        let none = format!("{}/ICMSHAR99*", dir.path().display());
        assert!(expand_inputs(&[none]).is_err());
    }

    #[test]
    fn test_cli_parses_convert() {
        let args = Args::try_parse_from([
            "fa-tool",
            "--log-level",
            "debug",
            "convert",
            "a",
            "b",
            "-o",
            "out.nc",
            "--field",
            "CLSTEMPERATURE",
            "--blacklist",
            "SURFACCPLUIE",
            "--proj",
            "EPSG:4326",
            "--consolidate-pseudo-3d",
        ])
        .unwrap();

        match args.command {
            Command::Convert {
                inputs,
                fields,
                proj,
                consolidate_pseudo_3d,
                overwrite,
                ..
            } => {
                assert_eq!(inputs, vec!["a", "b"]);
                assert_eq!(fields, vec!["CLSTEMPERATURE"]);
                assert_eq!(proj.as_deref(), Some("EPSG:4326"));
                assert!(consolidate_pseudo_3d);
                assert!(!overwrite);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_selection_defaults_to_all() {
        assert_eq!(
            selection(&[], &["X".to_string()]),
            FieldSelection::all().excluding(["X"])
        );
    }
}
