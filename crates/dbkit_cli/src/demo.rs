//! Demo asset publishing.
//!
//! # Responsibility
//! - Copy the bundled demo project into `<output>/demo`.
//! - Point the demo's `dbkit_core` dependency at a local checkout when one
//!   is available.
//!
//! # Invariants
//! - An existing `<output>/demo` is only replaced with `force`.
//! - Validation failures leave the output directory untouched.

use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory created inside the output directory.
pub const DEMO_DIR_NAME: &str = "demo";

const BUNDLED_DEMO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/demo");
const BUNDLED_CORE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../dbkit_core");

/// Registry form of the dependency as shipped in the demo manifest.
const CORE_DEPENDENCY: &str = "dbkit_core = \"0.1\"";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("could not find demo source at `{}`", .0.display())]
    SourceMissing(PathBuf),
    #[error("output directory does not exist: `{}`", .0.display())]
    OutputMissing(PathBuf),
    #[error("no write permission for `{}`", .0.display())]
    NotWritable(PathBuf),
    #[error("demo directory already exists: `{}` (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),
    #[error("failed to publish into `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One copied file, relative to the published demo directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub target: PathBuf,
    pub files: Vec<PublishedFile>,
    /// Local `dbkit_core` the demo manifest now points at, if any.
    pub core_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DemoPublisher {
    source: PathBuf,
    output_dir: PathBuf,
    core_crate: Option<PathBuf>,
}

impl DemoPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: PathBuf::from(BUNDLED_DEMO),
            output_dir: output_dir.into(),
            core_crate: fs::canonicalize(BUNDLED_CORE).ok(),
        }
    }

    /// Sets the `dbkit_core` checkout the published manifest should use;
    /// `None` keeps the registry dependency.
    pub fn with_core_crate(mut self, core_crate: Option<PathBuf>) -> Self {
        self.core_crate = core_crate;
        self
    }

    /// Publishes from another tree instead of the bundled demo.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target_dir(&self) -> PathBuf {
        self.output_dir.join(DEMO_DIR_NAME)
    }

    pub fn validate(&self) -> Result<(), PublishError> {
        if !self.source.is_dir() {
            return Err(PublishError::SourceMissing(self.source.clone()));
        }
        if !self.output_dir.is_dir() {
            return Err(PublishError::OutputMissing(self.output_dir.clone()));
        }
        let writable = fs::metadata(&self.output_dir)
            .map(|meta| !meta.permissions().readonly())
            .unwrap_or(false);
        if !writable {
            return Err(PublishError::NotWritable(self.output_dir.clone()));
        }
        Ok(())
    }

    /// Copies the demo tree; with `force` an existing target is replaced.
    pub fn publish(&self, force: bool) -> Result<Published, PublishError> {
        self.validate()?;

        let target = self.target_dir();
        if target.exists() {
            if !force {
                return Err(PublishError::AlreadyExists(target));
            }
            debug!(
                "event=demo_publish module=cli status=replace target={}",
                target.display()
            );
            remove_path(&target).map_err(|source| PublishError::Io {
                path: target.clone(),
                source,
            })?;
        }

        let mut files = Vec::new();
        copy_tree(&self.source, &target, Path::new(""), &mut files).map_err(|source| {
            PublishError::Io {
                path: target.clone(),
                source,
            }
        })?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let core_path = match &self.core_crate {
            Some(core) => {
                let manifest = target.join("Cargo.toml");
                link_core_crate(&manifest, core, &mut files)
                    .map_err(|source| PublishError::Io {
                        path: manifest,
                        source,
                    })?
                    .then(|| core.clone())
            }
            None => None,
        };

        info!(
            "event=demo_publish module=cli status=ok target={} files={} core_linked={}",
            target.display(),
            files.len(),
            core_path.is_some()
        );
        Ok(Published {
            target,
            files,
            core_path,
        })
    }
}

/// Rewrites the registry `dbkit_core` line of `manifest` into a path
/// dependency on `core`. Returns whether the manifest changed.
fn link_core_crate(
    manifest: &Path,
    core: &Path,
    files: &mut [PublishedFile],
) -> io::Result<bool> {
    if !manifest.is_file() {
        return Ok(false);
    }
    let core = core.to_string_lossy();
    // TOML literal strings cannot hold a quote.
    if core.contains('\'') {
        return Ok(false);
    }
    let content = fs::read_to_string(manifest)?;
    if !content.contains(CORE_DEPENDENCY) {
        return Ok(false);
    }

    let linked = content.replacen(
        CORE_DEPENDENCY,
        &format!("dbkit_core = {{ path = '{core}' }}"),
        1,
    );
    fs::write(manifest, &linked)?;
    if let Some(entry) = files
        .iter_mut()
        .find(|file| file.path == Path::new("Cargo.toml"))
    {
        entry.size = linked.len() as u64;
    }
    debug!(
        "event=demo_publish module=cli status=core_linked core={core}"
    );
    Ok(true)
}

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn copy_tree(
    from: &Path,
    to: &Path,
    relative: &Path,
    files: &mut Vec<PublishedFile>,
) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        let destination = to.join(&name);
        let relative = relative.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &destination, &relative, files)?;
        } else {
            let size = fs::copy(entry.path(), &destination)?;
            files.push(PublishedFile {
                path: relative,
                size,
            });
        }
    }
    Ok(())
}
