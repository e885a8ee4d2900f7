use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// Runtime value passed to and returned from service methods.
///
/// Service properties are stored as values too, so anything JSON can express
/// can cross a service boundary.
pub use serde_json::Value;

/// Visibility of a registered service within the realm tree.
///
/// `Server` services are visible to the owning realm and every realm above
/// it. `Plugin` services are visible only to the owning realm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sandbox {
    /// Visible to the owning realm and all of its ancestors.
    #[default]
    Server,
    /// Visible to the owning realm only.
    Plugin,
}

impl Sandbox {
    /// Returns `true` when visibility is restricted to the owning realm.
    #[must_use]
    pub fn is_sandboxed(self) -> bool {
        matches!(self, Sandbox::Plugin)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sandbox::Server => "server",
            Sandbox::Plugin => "plugin",
        }
    }
}

impl From<bool> for Sandbox {
    fn from(sandboxed: bool) -> Self {
        if sandboxed {
            Sandbox::Plugin
        } else {
            Sandbox::Server
        }
    }
}

impl FromStr for Sandbox {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Sandbox::Server),
            "plugin" => Ok(Sandbox::Plugin),
            other => Err(RegistrationError::InvalidSandbox(other.to_string())),
        }
    }
}

impl fmt::Display for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle of a realm node inside the host-owned realm arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RealmId(pub usize);

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "realm#{}", self.0)
    }
}
