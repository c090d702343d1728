//! Pipeline driver: source text → tokens → AST → block graph → bundle.
//!
//! Each phase runs to completion over every sprite before the next begins;
//! the reporter is checkpointed at every boundary so users see all of a
//! phase's errors at once and later phases never run on broken input. A
//! compilation owns all of its state — two concurrent compilations share
//! nothing mutable.

use anyhow::{Context, Result};
use core_catalog::{Catalog, CatalogOptions};
use core_config::Config;
use core_emit::{EmitOutput, Emitter, LayoutSettings};
use core_package::{AssetGeometry, AssetProbe, Bundler, Packager};
use core_project::{Costume, Meta, Project, Sound, Target};
use core_report::{ErrorKind, Phase, PhaseFailure, Reporter};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// One asset payload handed in by the caller.
#[derive(Debug, Clone)]
pub struct NamedAsset {
    pub name: String,
    pub data: Vec<u8>,
}

/// One sprite's script and asset payloads.
#[derive(Debug, Clone, Default)]
pub struct SpriteSource {
    pub script: String,
    pub costumes: Vec<NamedAsset>,
    pub sounds: Vec<NamedAsset>,
}

/// A whole compilation request. The sprite named `"Stage"` takes the project
/// root role; it is created empty when absent.
#[derive(Debug, Clone, Default)]
pub struct CompileRequest {
    pub sprites: Vec<(String, SpriteSource)>,
}

/// A successful compilation.
#[derive(Debug)]
pub struct CompileOutcome {
    pub id: String,
    pub bundle_path: PathBuf,
}

/// An aborted compilation: the phase that failed plus where the log landed.
#[derive(Debug, thiserror::Error)]
#[error("{failure}")]
pub struct CompileFailure {
    pub failure: PhaseFailure,
    pub log_path: Option<PathBuf>,
}

pub struct Compiler<'a> {
    catalog: Catalog,
    layout: LayoutSettings,
    probe: &'a dyn AssetProbe,
    bundler: &'a dyn Bundler,
    out_dir: PathBuf,
}

impl<'a> Compiler<'a> {
    /// Build a compiler from configuration. The catalog loads once here and
    /// is read-only afterwards.
    pub fn from_config(
        config: &Config,
        probe: &'a dyn AssetProbe,
        bundler: &'a dyn Bundler,
        out_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let options = CatalogOptions {
            allow_alias_override: config.file.catalog.allow_alias_override,
        };
        let catalog = match &config.file.catalog.commands_path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading catalog {}", path.display()))?;
                let catalog = Catalog::parse(&text, options).context("parsing catalog file")?;
                catalog.check_aliases().context("validating catalog aliases")?;
                catalog
            }
            None => Catalog::builtin(options).context("loading built-in catalog")?,
        };
        Ok(Self {
            catalog,
            layout: LayoutSettings {
                stack_spacing: config.file.layout.stack_spacing,
                comment_offset: config.file.layout.comment_offset,
            },
            probe,
            bundler,
            out_dir: out_dir.into(),
        })
    }

    /// Run one compilation end to end.
    pub fn compile(&self, request: &CompileRequest) -> Result<CompileOutcome, anyhow::Error> {
        let id = Uuid::new_v4().to_string();
        let mut reporter = Reporter::new();
        info!(target: "pipeline", id = id.as_str(), sprites = request.sprites.len(), "compile_start");

        match self.run_phases(request, &mut reporter) {
            Ok((project, assets)) => {
                let packager = Packager::new(&id)?;
                packager.write_project(&project)?;
                for (info, data) in &assets {
                    packager.write_asset(info, data)?;
                }
                packager.write_hierarchy(&project)?;
                reporter.log(format!(
                    "compiled {} target(s), {} monitor(s)",
                    project.targets.len(),
                    project.monitors.len()
                ));
                packager.write_log(reporter.journal())?;
                let bundle_path = packager.finish(self.bundler, &self.out_dir)?;
                info!(target: "pipeline", id = id.as_str(), "compile_ok");
                Ok(CompileOutcome { id, bundle_path })
            }
            Err(failure) => {
                let log_path = self.publish_failure_log(&id, &reporter);
                info!(target: "pipeline", id = id.as_str(), phase = %failure.phase, "compile_failed");
                Err(CompileFailure {
                    failure,
                    log_path,
                }
                .into())
            }
        }
    }

    /// The error-checked middle of the pipeline: everything that can fail
    /// with compile errors rather than I/O errors.
    fn run_phases(
        &self,
        request: &CompileRequest,
        reporter: &mut Reporter,
    ) -> Result<(Project, Vec<(core_package::AssetInfo, Vec<u8>)>), PhaseFailure> {
        // Lex every sprite before parsing any.
        reporter.log(format!("lexing {} sprite script(s)", request.sprites.len()));
        let mut token_streams = Vec::with_capacity(request.sprites.len());
        for (name, source) in &request.sprites {
            reporter.log(format!("lexing sprite '{name}'"));
            token_streams.push(core_lexer::tokenize(&source.script, reporter));
        }
        reporter.checkpoint(Phase::Lex)?;

        let mut asts = Vec::with_capacity(token_streams.len());
        for ((name, _), tokens) in request.sprites.iter().zip(token_streams) {
            reporter.log(format!("parsing sprite '{name}'"));
            asts.push(core_parser::parse(tokens, &self.catalog, reporter));
        }
        reporter.checkpoint(Phase::Parse)?;

        let mut emitter = Emitter::new(&self.catalog, reporter, self.layout);
        for ((name, _), stacks) in request.sprites.iter().zip(&asts) {
            emitter.emit_sprite(name, stacks);
        }
        let emitted = emitter.finish();
        reporter.checkpoint(Phase::Emit)?;

        let (project, assets) = self.assemble(request, emitted, reporter);
        reporter.checkpoint(Phase::Package)?;
        Ok((project, assets))
    }

    /// Build the final document: stage first, one target per sprite, assets
    /// probed and recorded on their targets.
    fn assemble(
        &self,
        request: &CompileRequest,
        emitted: EmitOutput,
        reporter: &mut Reporter,
    ) -> (Project, Vec<(core_package::AssetInfo, Vec<u8>)>) {
        let mut stage = Target::stage();
        stage.variables = emitted.variables.clone();
        stage.lists = emitted.lists.clone();
        stage.broadcasts = emitted.broadcasts.clone();

        let mut assets: Vec<(core_package::AssetInfo, Vec<u8>)> = Vec::new();
        let mut sprites: Vec<Target> = Vec::new();

        for (sprite_output, (name, source)) in emitted.sprites.into_iter().zip(&request.sprites) {
            let is_stage = name == "Stage";
            let mut target = if is_stage {
                std::mem::replace(&mut stage, Target::stage())
            } else {
                Target::sprite(name.clone())
            };
            target.blocks = sprite_output.blocks;
            target.comments = sprite_output.comments;

            for costume in &source.costumes {
                match self.probe.probe(&costume.name, &costume.data) {
                    Ok(info) => match info.geometry {
                        AssetGeometry::Image { center_x, center_y } => {
                            target.costumes.push(Costume {
                                name: costume.name.clone(),
                                bitmap_resolution: 1,
                                data_format: info.extension.clone(),
                                asset_id: info.content_hash.clone(),
                                md5ext: info.file_name(),
                                rotation_center_x: center_x,
                                rotation_center_y: center_y,
                            });
                            assets.push((info, costume.data.clone()));
                        }
                        AssetGeometry::Audio { .. } => reporter.report(
                            ErrorKind::UnsupportedAsset,
                            format!("costume '{}' holds audio data", costume.name),
                            costume.name.clone(),
                            None,
                        ),
                    },
                    Err(err) => reporter.report(
                        ErrorKind::UnsupportedAsset,
                        err.to_string(),
                        costume.name.clone(),
                        None,
                    ),
                }
            }
            for sound in &source.sounds {
                match self.probe.probe(&sound.name, &sound.data) {
                    Ok(info) => match info.geometry {
                        AssetGeometry::Audio { sample_count, rate } => {
                            target.sounds.push(Sound {
                                name: sound.name.clone(),
                                asset_id: info.content_hash.clone(),
                                md5ext: info.file_name(),
                                data_format: info.extension.clone(),
                                format: String::new(),
                                rate,
                                sample_count,
                            });
                            assets.push((info, sound.data.clone()));
                        }
                        AssetGeometry::Image { .. } => reporter.report(
                            ErrorKind::UnsupportedAsset,
                            format!("sound '{}' holds image data", sound.name),
                            sound.name.clone(),
                            None,
                        ),
                    },
                    Err(err) => reporter.report(
                        ErrorKind::UnsupportedAsset,
                        err.to_string(),
                        sound.name.clone(),
                        None,
                    ),
                }
            }

            if is_stage {
                // Put the stage back, now carrying its blocks and assets.
                let mut restored = target;
                restored.variables = emitted.variables.clone();
                restored.lists = emitted.lists.clone();
                restored.broadcasts = emitted.broadcasts.clone();
                stage = restored;
            } else {
                sprites.push(target);
            }
        }

        let mut targets = vec![stage];
        targets.extend(sprites);

        let extensions = if emitted.pen_used {
            vec!["pen".to_string()]
        } else {
            Vec::new()
        };

        (
            Project {
                targets,
                monitors: emitted.monitors,
                extensions,
                meta: Meta::default(),
            },
            assets,
        )
    }

    /// Publish just the log for an aborted compilation so the caller can
    /// point users at the full error list.
    fn publish_failure_log(&self, id: &str, reporter: &Reporter) -> Option<PathBuf> {
        let dir = self.out_dir.join(format!("program_{id}"));
        fs::create_dir_all(&dir).ok()?;
        let path = dir.join(format!("log_{id}.txt"));
        let mut text = format!("Log file for project {id}\n");
        for line in reporter.journal() {
            text.push_str(line);
            text.push('\n');
        }
        fs::write(&path, text).ok()?;
        Some(path)
    }
}

/// Convenience wrapper for tests and simple callers: compile a single sprite
/// script with no assets.
pub fn single_sprite_request(name: &str, script: &str) -> CompileRequest {
    CompileRequest {
        sprites: vec![(
            name.to_string(),
            SpriteSource {
                script: script.to_string(),
                costumes: Vec::new(),
                sounds: Vec::new(),
            },
        )],
    }
}
