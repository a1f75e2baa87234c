//! API versions.
//!
//! Every route is mounted under a version prefix: `v1`, `v2alpha1`,
//! `v3beta2`, ...

use crate::ApplicationError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v(?P<major>\d+)(?:(?P<stage>alpha|beta)(?P<iteration>\d+))?$")
        .unwrap_or_else(|err| unreachable!("version pattern is valid: {err}"))
});

/// Pre-release stage of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Alpha,
    Beta,
}

/// A parsed `v{N}[alpha|beta]{N}` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    raw: String,
    major: u32,
    stage: Option<(Stage, u32)>,
}

impl ApiVersion {
    pub fn parse(version: &str) -> Result<Self, ApplicationError> {
        let invalid = || ApplicationError::InvalidVersion(version.to_string());
        let captures = VERSION_PATTERN.captures(version).ok_or_else(invalid)?;

        let major = captures["major"].parse().map_err(|_| invalid())?;
        let stage = match (captures.name("stage"), captures.name("iteration")) {
            (Some(stage), Some(iteration)) => {
                let stage = if stage.as_str() == "alpha" {
                    Stage::Alpha
                } else {
                    Stage::Beta
                };
                Some((stage, iteration.as_str().parse().map_err(|_| invalid())?))
            }
            _ => None,
        };

        Ok(Self {
            raw: version.to_string(),
            major,
            stage,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn stage(&self) -> Option<(Stage, u32)> {
        self.stage
    }

    pub fn is_prerelease(&self) -> bool {
        self.stage.is_some()
    }
}

impl FromStr for ApiVersion {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
