//! Explicit host facts threaded through discovery and reconciliation.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use telstack_config::Config;
use thiserror::Error;
use tracing::warn;

const HOST_TARGET: &str = "telstack_lifecycle::host";
const OSRELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// Host context: kernel release and the file locations the orchestrator
/// reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    kernel_release: Option<String>,
    active_config_path: Utf8PathBuf,
    span_declaration_path: Utf8PathBuf,
    scratch_root: Utf8PathBuf,
    modules_root: Utf8PathBuf,
}

impl HostContext {
    /// Builds the context for the running host.
    ///
    /// An unreadable kernel release is logged and left unset; it only limits
    /// driver candidate filtering.
    #[must_use]
    pub fn detect(config: &Config) -> Self {
        let kernel_release = match fs::read_to_string(OSRELEASE_PATH) {
            Ok(release) => Some(release.trim().to_owned()),
            Err(error) => {
                warn!(
                    target: HOST_TARGET,
                    path = OSRELEASE_PATH,
                    %error,
                    "cannot read kernel release; driver candidates will not be filtered"
                );
                None
            }
        };
        Self::from_config(config, kernel_release)
    }

    /// Builds a context from configuration and an explicit kernel release.
    #[must_use]
    pub fn from_config(config: &Config, kernel_release: Option<String>) -> Self {
        Self {
            kernel_release,
            active_config_path: config.active_config_path().to_path_buf(),
            span_declaration_path: config.span_declaration_path().to_path_buf(),
            scratch_root: config.scratch_root().to_path_buf(),
            modules_root: config.modules_root().to_path_buf(),
        }
    }

    /// Running kernel release, when known.
    #[must_use]
    pub fn kernel_release(&self) -> Option<&str> {
        self.kernel_release.as_deref()
    }

    /// Active channel configuration file.
    #[must_use]
    pub fn active_config_path(&self) -> &Utf8Path {
        &self.active_config_path
    }

    /// Administrator span declaration file.
    #[must_use]
    pub fn span_declaration_path(&self) -> &Utf8Path {
        &self.span_declaration_path
    }

    /// Directory under which scratch output is generated.
    #[must_use]
    pub fn scratch_root(&self) -> &Utf8Path {
        &self.scratch_root
    }

    /// Module dependency index for the running kernel.
    #[must_use]
    pub fn modules_dep_path(&self) -> Option<Utf8PathBuf> {
        self.kernel_release
            .as_deref()
            .map(|release| self.modules_root.join(release).join("modules.dep"))
    }

    /// Kernel modules installed for the running kernel, or `None` when the
    /// index cannot be read.
    #[must_use]
    pub fn installed_modules(&self) -> Option<BTreeSet<String>> {
        let path = self.modules_dep_path()?;
        match fs::read_to_string(&path) {
            Ok(index) => Some(parse_modules_dep(&index)),
            Err(error) => {
                warn!(target: HOST_TARGET, %path, %error, "cannot read module index");
                None
            }
        }
    }

    /// Reads the active channel configuration; a missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Read`] for failures other than absence.
    pub fn read_active_config(&self) -> Result<String, HostError> {
        read_optional(&self.active_config_path).map(Option::unwrap_or_default)
    }

    /// Reads the span declaration, or `None` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Read`] for failures other than absence.
    pub fn read_span_declaration(&self) -> Result<Option<String>, HostError> {
        read_optional(&self.span_declaration_path)
    }

    /// Overrides the active configuration path.
    #[must_use]
    pub fn with_active_config_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.active_config_path = path.into();
        self
    }

    /// Overrides the span declaration path.
    #[must_use]
    pub fn with_span_declaration_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.span_declaration_path = path.into();
        self
    }

    /// Overrides the scratch root.
    #[must_use]
    pub fn with_scratch_root(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.scratch_root = path.into();
        self
    }

    /// Overrides the kernel modules root.
    #[must_use]
    pub fn with_modules_root(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.modules_root = path.into();
        self
    }
}

/// Errors raised while reading host files.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// A host file exists but could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// File being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

fn read_optional(path: &Utf8Path) -> Result<Option<String>, HostError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(HostError::Read {
            path: path.to_path_buf(),
            source: Arc::new(error),
        }),
    }
}

/// Extracts module names from a `modules.dep` index.
///
/// Each line starts with the module's path, for example
/// `kernel/drivers/dahdi/wct4xxp/wct4xxp.ko.xz: kernel/drivers/dahdi/dahdi.ko.xz`.
pub(crate) fn parse_modules_dep(index: &str) -> BTreeSet<String> {
    index
        .lines()
        .filter_map(|line| line.split_once(':').map(|(path, _)| path))
        .filter_map(|path| path.rsplit('/').next())
        .filter_map(|file| file.split_once(".ko").map(|(stem, _)| stem))
        .filter(|stem| !stem.is_empty())
        .map(normalise_module_name)
        .collect()
}

/// Kernel module names treat `-` and `_` as equivalent.
pub(crate) fn normalise_module_name(name: &str) -> String {
    name.trim().replace('-', "_")
}
