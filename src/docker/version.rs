//! Patch-version bumping for the optional `.version` file in a build
//! directory.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl PatchVersion {
    /// The next patch version, or `None` when the patch number is at its
    /// maximum.
    pub fn bumped(self) -> Option<Self> {
        Some(Self {
            patch: self.patch.checked_add(1)?,
            ..self
        })
    }
}

impl FromStr for PatchVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            bail!("expected three dot-separated components, got {:?}", s.trim());
        }

        let component = |i: usize| -> Result<u64> {
            parts[i]
                .parse()
                .map_err(|e| anyhow!("version component {:?}: {e}", parts[i]))
        };

        Ok(Self {
            major: component(0)?,
            minor: component(1)?,
            patch: component(2)?,
        })
    }
}

impl fmt::Display for PatchVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Increment the patch component stored in `path` and return the new
/// version. A trailing newline in the file is kept.
pub async fn bump_version_file(path: &Path) -> Result<PatchVersion> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read version file {}", path.display()))?;

    let current = contents
        .parse::<PatchVersion>()
        .with_context(|| format!("parse version file {}", path.display()))?;
    let next = current
        .bumped()
        .ok_or_else(|| anyhow!("version {current} in {} cannot be bumped further", path.display()))?;

    let newline = if contents.ends_with('\n') { "\n" } else { "" };
    tokio::fs::write(path, format!("{next}{newline}"))
        .await
        .with_context(|| format!("write version file {}", path.display()))?;

    Ok(next)
}
