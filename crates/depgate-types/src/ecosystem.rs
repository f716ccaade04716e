//! Package-manager families.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// A package-manager family. Determines manifest format and how bulk
/// submissions are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// `package.json`
    Npm,
    /// `pom.xml`
    Maven,
    /// `build.gradle` / `build.gradle.kts`
    Gradle,
}

impl Ecosystem {
    /// All supported ecosystems, in submission order.
    pub const ALL: [Ecosystem; 3] = [Ecosystem::Npm, Ecosystem::Maven, Ecosystem::Gradle];

    /// Wire tag sent as `ecosystem` in every request.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Maven => "maven",
            Ecosystem::Gradle => "gradle",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an ecosystem tag we do not know.
#[derive(Debug, Clone, Error)]
#[error("unknown ecosystem: {0}")]
pub struct UnknownEcosystem(pub String);

impl FromStr for Ecosystem {
    type Err = UnknownEcosystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "npm" => Ok(Ecosystem::Npm),
            "maven" => Ok(Ecosystem::Maven),
            "gradle" => Ok(Ecosystem::Gradle),
            other => Err(UnknownEcosystem(other.to_string())),
        }
    }
}
