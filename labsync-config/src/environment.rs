use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Variable naming the runtime environment.
const ENVIRONMENT_VAR: &str = "APP_ENVIRONMENT";

/// An environment name other than `dev` or `prod`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a supported environment, expected `dev` or `prod`")]
pub struct UnknownEnvironment(pub String);

/// Runtime environment of the gateway.
///
/// Selects the environment specific configuration file and the log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    /// Reads `APP_ENVIRONMENT`. An unset variable selects [`Environment::Dev`].
    pub fn load() -> Result<Self, UnknownEnvironment> {
        match std::env::var(ENVIRONMENT_VAR) {
            Ok(name) => name.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn is_prod(self) -> bool {
        self == Environment::Prod
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        [Environment::Dev, Environment::Prod]
            .into_iter()
            .find(|environment| environment.as_str().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| UnknownEnvironment(name.to_string()))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
