use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::debug;

use ldraw::{ConnectionCatalog, DirectoryLibrary, ImportOptions, ImportedModel, Session};

pub const LIBRARY_ENV: &str = "LDRAWDIR";
pub const CONNECTIONS_ENV: &str = "LDRAW_CONNECTIONS";

/// Where the part library and the connection bundle live. Command line
/// flags win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Locations {
    pub library: Option<PathBuf>,
    pub connections: Option<PathBuf>,
}

impl Locations {
    pub fn resolve(library: Option<PathBuf>, connections: Option<PathBuf>) -> Self {
        let from_env = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            library: library.or_else(|| from_env(LIBRARY_ENV)),
            connections: connections.or_else(|| from_env(CONNECTIONS_ENV)),
        }
    }

    fn library(&self) -> Result<Box<DirectoryLibrary>> {
        let root = self.library.as_ref().with_context(|| {
            format!("No LDraw library given, use --library or set {LIBRARY_ENV}")
        })?;
        if !root.is_dir() {
            anyhow::bail!("LDraw library not found: {}", root.display());
        }
        Ok(Box::new(DirectoryLibrary::new(root)))
    }

    /// A session over the library. Without a connection bundle the session
    /// has an empty catalog.
    pub fn open(&self) -> Result<Session> {
        let library = self.library()?;
        match &self.connections {
            Some(bundle) => Session::open(library, bundle).with_context(|| {
                format!("Failed to load connection bundle {}", bundle.display())
            }),
            None => {
                debug!("No connection bundle, connection lookups will be empty");
                Ok(Session::new(library, ConnectionCatalog::default()))
            }
        }
    }

    /// Like [`Locations::open`] but the bundle is mandatory.
    pub fn open_with_connections(&self) -> Result<Session> {
        if self.connections.is_none() {
            anyhow::bail!(
                "No connection bundle given, use --connections or set {CONNECTIONS_ENV}"
            );
        }
        self.open()
    }
}

/// Imports a model into `session`, showing progress on a spinner.
pub fn import_model(session: &mut Session, file: &Path) -> Result<ImportedModel> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let name = file.display().to_string();
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Reading {name}"));

    let result = {
        let mut options = ImportOptions::new().on_progress(|done| {
            spinner.set_message(format!("Reading {name} ({:.0}%)", done * 100.0));
        });
        session.import_file(file, &mut options)
    };
    spinner.finish_and_clear();
    result.with_context(|| format!("Failed to import {}", file.display()))
}
