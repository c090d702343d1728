//! Bundle packaging: staging directory, `project.json`, asset files, the
//! compilation log and the hierarchy debug tree.
//!
//! The packager owns a per-compilation staging directory (a `TempDir`, so an
//! abandoned compilation cleans itself up) and a [`Bundler`] turns the staged
//! files into the published artifact. Archiving to a single file is a thin
//! wrapper outside the compiler; the provided [`DirBundler`] publishes the
//! staging directory as-is.

use anyhow::{Context, Result};
use core_project::Project;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

mod asset;
mod hierarchy;

pub use asset::{AssetGeometry, AssetInfo, AssetProbe, ProbeError};
pub use hierarchy::render as render_hierarchy;

/// Turns a staged directory into the published artifact and returns its
/// path.
pub trait Bundler {
    fn bundle(&self, staging: &Path, out_dir: &Path, id: &str) -> Result<PathBuf>;
}

/// Publishes the staging directory verbatim as `program_<id>/` under the
/// output root.
#[derive(Debug, Default)]
pub struct DirBundler;

impl Bundler for DirBundler {
    fn bundle(&self, staging: &Path, out_dir: &Path, id: &str) -> Result<PathBuf> {
        let dest = out_dir.join(format!("program_{id}"));
        fs::create_dir_all(&dest)
            .with_context(|| format!("creating bundle directory {}", dest.display()))?;
        for entry in fs::read_dir(staging).context("reading staging directory")? {
            let entry = entry?;
            let target = dest.join(entry.file_name());
            fs::copy(entry.path(), &target)
                .with_context(|| format!("publishing {}", target.display()))?;
        }
        Ok(dest)
    }
}

/// Per-compilation staging area.
pub struct Packager {
    id: String,
    staging: TempDir,
}

impl Packager {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            staging: TempDir::new().context("creating staging directory")?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }

    /// Write `project.json` into the staging directory.
    pub fn write_project(&self, project: &Project) -> Result<()> {
        let path = self.staging.path().join("project.json");
        let json = serde_json::to_string(project).context("serialising project document")?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Write one asset payload under its `<hash>.<ext>` name. Re-writing the
    /// same name is fine; assets are content-addressed.
    pub fn write_asset(&self, info: &AssetInfo, data: &[u8]) -> Result<()> {
        let path = self.staging.path().join(info.file_name());
        fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Write the compilation journal as `log_<id>.txt`.
    pub fn write_log(&self, journal: &[String]) -> Result<()> {
        let path = self.staging.path().join(format!("log_{}.txt", self.id));
        let mut text = format!("Log file for project {}\n", self.id);
        for line in journal {
            text.push_str(line);
            text.push('\n');
        }
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Write the block hierarchy tree as `hierarchy_<id>.txt`.
    pub fn write_hierarchy(&self, project: &Project) -> Result<()> {
        let path = self
            .staging
            .path()
            .join(format!("hierarchy_{}.txt", self.id));
        fs::write(&path, hierarchy::render(project))
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Publish the staged files and drop the staging directory.
    pub fn finish(self, bundler: &dyn Bundler, out_dir: &Path) -> Result<PathBuf> {
        let published = bundler.bundle(self.staging.path(), out_dir, &self.id)?;
        info!(target: "package", id = self.id.as_str(), path = %published.display(), "bundle_published");
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_project::{Meta, Target};

    fn empty_project() -> Project {
        Project {
            targets: vec![Target::stage()],
            monitors: Vec::new(),
            extensions: Vec::new(),
            meta: Meta::default(),
        }
    }

    #[test]
    fn staged_files_land_in_bundle() {
        let packager = Packager::new("t1").unwrap();
        packager.write_project(&empty_project()).unwrap();
        packager.write_log(&["lexing".to_string()]).unwrap();
        packager.write_hierarchy(&empty_project()).unwrap();
        packager
            .write_asset(
                &AssetInfo {
                    content_hash: "cafe".into(),
                    extension: "png".into(),
                    geometry: AssetGeometry::Image {
                        center_x: 0.0,
                        center_y: 0.0,
                    },
                },
                b"not really a png",
            )
            .unwrap();

        let out = tempfile::tempdir().unwrap();
        let published = packager.finish(&DirBundler, out.path()).unwrap();
        assert!(published.ends_with("program_t1"));
        for name in ["project.json", "log_t1.txt", "hierarchy_t1.txt", "cafe.png"] {
            assert!(published.join(name).exists(), "{name} missing from bundle");
        }
    }

    #[test]
    fn project_json_starts_with_stage() {
        let packager = Packager::new("t2").unwrap();
        packager.write_project(&empty_project()).unwrap();
        let text = fs::read_to_string(packager.staging_path().join("project.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["targets"][0]["isStage"], true);
        assert_eq!(value["meta"]["semver"], "3.0.0");
    }

    #[test]
    fn log_carries_header_and_lines() {
        let packager = Packager::new("t3").unwrap();
        packager
            .write_log(&["first".to_string(), "second".to_string()])
            .unwrap();
        let text = fs::read_to_string(packager.staging_path().join("log_t3.txt")).unwrap();
        assert!(text.starts_with("Log file for project t3\n"));
        assert!(text.contains("first\nsecond\n"));
    }
}
