//! Build metadata embedded by vergen.

use std::fmt;

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git state of the tree the binary was built from.
///
/// Fields read "unknown" when the build ran outside a git checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub sha: &'static str,
    pub dirty: bool,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: option_env!("VERGEN_GIT_BRANCH").unwrap_or("unknown"),
            sha: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
            dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
        }
    }

    pub fn short_sha(&self) -> &'static str {
        &self.sha[..7.min(self.sha.len())]
    }
}

/// `{version}+{branch}.{sha}`, with `.dirty` appended for modified trees.
impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}.{}", self.version, self.branch, self.short_sha())?;
        if self.dirty {
            f.write_str(".dirty")?;
        }
        Ok(())
    }
}

/// Version reported by `/api/health` and the daemon's startup log.
pub fn version_string() -> String {
    BuildInfo::current().to_string()
}

/// `User-Agent` sent to music providers.
pub fn user_agent() -> String {
    format!("vugru/{PKG_VERSION}")
}
