//! Katnip compiler entrypoint.

use anyhow::{Context, Result};
use clap::Parser;
use core_package::DirBundler;
use core_pipeline::{CompileFailure, CompileRequest, Compiler, NamedAsset, SpriteSource};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod probe;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "knipc", version, about = "Katnip to block-project compiler")] // minimal metadata
struct Args {
    /// Katnip script file(s); each becomes one sprite named after its file
    /// stem. Name a file `Stage.knip` to script the stage itself.
    #[arg(required = true)]
    pub scripts: Vec<PathBuf>,

    /// Costume files for the first sprite, as `name=path`.
    #[arg(long = "costume")]
    pub costumes: Vec<String>,

    /// Sound files for the first sprite, as `name=path`.
    #[arg(long = "sound")]
    pub sounds: Vec<String>,

    /// Output directory for generated bundles.
    #[arg(long = "out", default_value = "generated_projects")]
    pub out: PathBuf,

    /// Optional configuration file path (overrides discovery of
    /// `katnipc.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Let catalog aliases shadow built-in commands.
    #[arg(long = "allow-alias-override")]
    pub allow_alias_override: bool,
}

fn configure_logging() -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(Path::new("."), "knipc.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(nb_writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn parse_asset_specs(specs: &[String]) -> Result<Vec<NamedAsset>> {
    let mut assets = Vec::with_capacity(specs.len());
    for spec in specs {
        let (name, path) = spec
            .split_once('=')
            .with_context(|| format!("asset '{spec}' must be name=path"))?;
        let data =
            std::fs::read(path).with_context(|| format!("reading asset file '{path}'"))?;
        assets.push(NamedAsset {
            name: name.to_string(),
            data,
        });
    }
    Ok(assets)
}

fn build_request(args: &Args) -> Result<CompileRequest> {
    let mut sprites = Vec::with_capacity(args.scripts.len());
    for (index, path) in args.scripts.iter().enumerate() {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("reading script '{}'", path.display()))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("Sprite{}", index + 1));
        let (costumes, sounds) = if index == 0 {
            (
                parse_asset_specs(&args.costumes)?,
                parse_asset_specs(&args.sounds)?,
            )
        } else {
            (Vec::new(), Vec::new())
        };
        sprites.push((
            name,
            SpriteSource {
                script,
                costumes,
                sounds,
            },
        ));
    }
    // The stage target hosts project-wide symbols; make sure it sorts first
    // so target order matches the document's stage-first layout.
    sprites.sort_by_key(|(name, _)| name != "Stage");
    Ok(CompileRequest { sprites })
}

fn run(args: &Args) -> Result<()> {
    let mut config = core_config::load_from(args.config.clone())?;
    if args.allow_alias_override {
        config.file.catalog.allow_alias_override = true;
    }

    let probe = probe::SniffProbe;
    let bundler = DirBundler;
    let compiler = Compiler::from_config(&config, &probe, &bundler, &args.out)?;
    let request = build_request(args)?;
    info!(
        target: "runtime",
        sprites = request.sprites.len(),
        out = %args.out.display(),
        "compile_request"
    );

    match compiler.compile(&request) {
        Ok(outcome) => {
            println!("compiled project {}", outcome.id);
            println!("bundle: {}", outcome.bundle_path.display());
            Ok(())
        }
        Err(err) => {
            if let Some(failure) = err.downcast_ref::<CompileFailure>() {
                eprintln!(
                    "compilation failed in {} phase with {} error(s):",
                    failure.failure.phase,
                    failure.failure.errors.len()
                );
                for compile_error in &failure.failure.errors {
                    eprintln!("  {compile_error}");
                }
                if let Some(log) = &failure.log_path {
                    eprintln!("full log: {}", log.display());
                }
            }
            Err(err)
        }
    }
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    let _log_guard = match configure_logging() {
        Ok(guard) => Some(guard),
        Err(_) => None,
    };
    info!(target: "runtime", "startup");

    match run(&args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "runtime", error = %err, "compile_aborted");
            eprintln!("error: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_specs_parse_and_read() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"RIFFdata").unwrap();
        let spec = format!("Pop={}", tmp.path().display());
        let assets = parse_asset_specs(&[spec]).unwrap();
        assert_eq!(assets[0].name, "Pop");
        assert_eq!(assets[0].data, b"RIFFdata");
    }

    #[test]
    fn malformed_asset_spec_is_an_error() {
        assert!(parse_asset_specs(&["nopath".to_string()]).is_err());
    }

    #[test]
    fn stage_script_sorts_first() {
        let dir = tempfile::tempdir().unwrap();
        let stage = dir.path().join("Stage.knip");
        let sprite = dir.path().join("S1.knip");
        std::fs::write(&stage, "").unwrap();
        std::fs::write(&sprite, "").unwrap();
        let args = Args {
            scripts: vec![sprite, stage],
            costumes: Vec::new(),
            sounds: Vec::new(),
            out: PathBuf::from("out"),
            config: None,
            allow_alias_override: false,
        };
        let request = build_request(&args).unwrap();
        assert_eq!(request.sprites[0].0, "Stage");
        assert_eq!(request.sprites[1].0, "S1");
    }
}
