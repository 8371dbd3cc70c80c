//! Module and runtime version triples.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// `major.minor.patch`, ordered lexicographically by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ModuleVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True if `self` lies in `[min, max]` (both ends inclusive).
    pub fn within(&self, min: ModuleVersion, max: ModuleVersion) -> bool {
        min <= *self && *self <= max
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ModuleVersion {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(anyhow!("version '{raw}' must have the form major.minor.patch"));
        }
        let component = |idx: usize, name: &str| -> Result<u32> {
            parts[idx]
                .parse::<u32>()
                .with_context(|| format!("parse {name} component of version '{raw}'"))
        };
        Ok(Self::new(
            component(0, "major")?,
            component(1, "minor")?,
            component(2, "patch")?,
        ))
    }
}

impl TryFrom<String> for ModuleVersion {
    type Error = anyhow::Error;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl From<ModuleVersion> for String {
    fn from(version: ModuleVersion) -> Self {
        version.to_string()
    }
}
