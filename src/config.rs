//! Settings for opening the category database, read from the command line or the environment.

use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use clap::Args;

/// The name of the schema SQLite uses for the database it was opened with.
const MAIN_SCHEMA: &str = "main";

/// How to open the database and size its connection pool.
#[derive(Args, Debug, Clone)]
pub struct DatabaseConfig {
    /// File path to the SQLite database holding the category table.
    #[arg(long = "db-database", env = "DB_DATABASE")]
    pub database: PathBuf,

    /// The schema the category table lives in.
    ///
    /// Any schema other than `main` attaches the database file under that name.
    #[arg(long = "db-schema", env = "DB_SCHEMA", default_value = MAIN_SCHEMA)]
    pub schema: Schema,

    /// The most connections the pool will open at once.
    #[arg(long = "db-max-connections", env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// The number of idle connections the pool tries to keep open.
    #[arg(long = "db-min-idle", env = "DB_MIN_IDLE", default_value_t = 2)]
    pub min_idle: u32,

    /// Seconds a connection may sit idle before the pool closes it.
    ///
    /// Unset by default, so idle connections are kept open.
    #[arg(long = "db-idle-timeout-secs", env = "DB_IDLE_TIMEOUT_SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub idle_timeout_secs: Option<u64>,

    /// Seconds a connection may live before the pool replaces it.
    ///
    /// Unset by default, so connections are reused for as long as they work.
    #[arg(long = "db-max-lifetime-secs", env = "DB_MAX_LIFETIME_SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_lifetime_secs: Option<u64>,
}

impl DatabaseConfig {
    /// A config for the database at `database` using the default pool settings.
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            schema: Schema::default(),
            max_connections: 10,
            min_idle: 2,
            idle_timeout_secs: None,
            max_lifetime_secs: None,
        }
    }

    /// How long a connection may sit idle, if there is a limit.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// How long a connection may live, if there is a limit.
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_secs.map(Duration::from_secs)
    }
}

/// A validated SQLite schema name.
///
/// Schema names are spliced into SQL, so they are restricted to ASCII letters,
/// digits and underscores and must not start with a digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema(String);

impl Schema {
    /// Whether this is the schema of the database the connection was opened with.
    pub fn is_main(&self) -> bool {
        self.0.eq_ignore_ascii_case(MAIN_SCHEMA)
    }

    /// The schema name quoted for use in SQL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self(MAIN_SCHEMA.to_owned())
    }
}

impl FromStr for Schema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();

        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_start && valid_rest {
            Ok(Self(s.to_owned()))
        } else {
            Err(format!(
                "\"{s}\" is not a valid schema name, use letters, digits and underscores"
            ))
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod schema_tests {
    use super::Schema;

    #[test]
    fn accepts_identifiers() {
        for name in ["main", "categories", "_private", "schema_2"] {
            assert!(name.parse::<Schema>().is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_names_that_need_escaping() {
        for name in ["", "2fast", "drop table", "a\"b", "semi;colon"] {
            assert!(name.parse::<Schema>().is_err(), "{name} should be invalid");
        }
    }

    #[test]
    fn default_is_main() {
        assert!(Schema::default().is_main());
        assert!("MAIN".parse::<Schema>().unwrap().is_main());
        assert!(!"categories".parse::<Schema>().unwrap().is_main());
    }

    #[test]
    fn quotes_name() {
        let schema: Schema = "categories".parse().unwrap();

        assert_eq!(schema.quoted(), "\"categories\"");
    }
}
