//! Connection options.

use url::Url;

use crate::error::{Error, Verbosity};

/// Environment variables forwarded as startup parameters when set.
///
/// A variable whose value is `default` (any case) is not sent.
pub const DEFAULT_ENV_OPTIONS: &[EnvOption] = &[
    EnvOption::new("PGDATESTYLE", "datestyle"),
    EnvOption::new("PGTZ", "timezone"),
    EnvOption::new("PGCLIENTENCODING", "client_encoding"),
    EnvOption::new("PGGEQO", "geqo"),
];

/// Maps an environment variable to a server parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvOption {
    /// Environment variable to read
    pub env_var: &'static str,
    /// Server parameter to set
    pub param: &'static str,
}

impl EnvOption {
    /// Create a mapping.
    pub const fn new(env_var: &'static str, param: &'static str) -> Self {
        Self { env_var, param }
    }
}

/// Connection options for PostgreSQL.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `""`
    pub host: String,

    /// Port number for the PostgreSQL server.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Username sent in the startup packet.
    ///
    /// Default: `""`
    pub user: String,

    /// Database name to use.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Command-line options for the backend (`-c name=value ...`).
    ///
    /// Default: `None`
    pub options: Option<String>,

    /// Additional startup parameters, sent after the environment options.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,

    /// Environment variables forwarded as startup parameters.
    ///
    /// Default: [`DEFAULT_ENV_OPTIONS`]
    pub env_options: Vec<EnvOption>,

    /// How much detail goes into composed error messages.
    ///
    /// Default: `Verbosity::Default`
    pub verbosity: Verbosity,

    /// Largest message the input buffer will grow to hold, in bytes.
    ///
    /// Default: `1 GiB`
    pub max_message_len: usize,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5432,
            user: String::new(),
            database: None,
            options: None,
            params: Vec::new(),
            env_options: DEFAULT_ENV_OPTIONS.to_vec(),
            verbosity: Verbosity::Default,
            max_message_len: 1 << 30,
        }
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user@]host[:port][/database][?param1=value1&param2=value2&..]`
    ///
    /// Supported query parameters:
    /// - `options`: backend command-line options
    /// - `verbosity`: terse, default, verbose
    /// - `max_message_len`: input buffer limit in bytes (positive integer)
    ///
    /// Anything else is sent to the server as a startup parameter.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "postgresql", "pg"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(5432),
            user: url.username().to_string(),
            database: url
                .path()
                .strip_prefix('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "options" => {
                    opts.options = Some(value.to_string());
                }
                "verbosity" => {
                    opts.verbosity = match value.as_ref() {
                        "terse" => Verbosity::Terse,
                        "default" => Verbosity::Default,
                        "verbose" => Verbosity::Verbose,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid verbosity: expected one of ['terse', 'default', 'verbose'], got {}",
                                value
                            )));
                        }
                    };
                }
                "max_message_len" => {
                    opts.max_message_len = value
                        .parse()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| {
                            Error::InvalidUsage(format!("Invalid max_message_len: {}", value))
                        })?;
                }
                _ => {
                    opts.params.push((key.to_string(), value.to_string()));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_url() {
        let opts = Opts::try_from(
            "postgres://alice@db.local:6543/app?options=-c%20geqo%3Doff&verbosity=verbose&application_name=x",
        )
        .unwrap();
        assert_eq!(opts.host, "db.local");
        assert_eq!(opts.port, 6543);
        assert_eq!(opts.user, "alice");
        assert_eq!(opts.database.as_deref(), Some("app"));
        assert_eq!(opts.options.as_deref(), Some("-c geqo=off"));
        assert_eq!(opts.verbosity, Verbosity::Verbose);
        assert_eq!(
            opts.params,
            vec![("application_name".to_string(), "x".to_string())]
        );
        assert_eq!(opts.env_options, DEFAULT_ENV_OPTIONS);
    }

    #[test]
    fn defaults_without_path() {
        let opts = Opts::try_from("pg://localhost").unwrap();
        assert_eq!(opts.port, 5432);
        assert_eq!(opts.database, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Opts::try_from("mysql://localhost").is_err());
        assert!(Opts::try_from("postgres://localhost?verbosity=loud").is_err());
        assert!(Opts::try_from("postgres://localhost?max_message_len=0").is_err());
    }
}
