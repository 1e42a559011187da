//! Build mode selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The optimisation level a compile is requested with.
///
/// Parsing is case-insensitive; the wire form is lowercase.
///
/// # Examples
///
/// ```
/// use fl_core::BuildMode;
///
/// let mode: BuildMode = "RELEASE".parse().unwrap();
/// assert_eq!(mode, BuildMode::Release);
/// assert_eq!(mode.as_str(), "release");
/// assert_eq!(BuildMode::default(), BuildMode::Quick);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Unoptimised with debug info.
    Debug,
    /// Fast turnaround, light optimisation.
    #[default]
    Quick,
    /// Fully optimised.
    Release,
}

impl BuildMode {
    /// All build modes, in ascending optimisation order.
    pub const ALL: [Self; 3] = [Self::Debug, Self::Quick, Self::Release];

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Quick => "quick",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ConfigError::invalid_option(
                    "build_mode",
                    format!("must be one of debug, quick, release; got '{s}'"),
                )
            })
    }
}
