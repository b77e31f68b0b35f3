//! The health check: pings the database and reports on the connection pool.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{Database, Deadline, Error, PoolStats};

const HEALTHY: &str = "It's healthy";
const HEAVY_LOAD: &str = "The database is experiencing heavy load.";
const BOTTLENECK: &str =
    "The database has a high number of wait events, indicating potential bottlenecks.";
const IDLE_CLOSED: &str =
    "Many idle connections are being closed, consider revising the connection pool settings.";
const LIFETIME_CLOSED: &str = "Many connections are being closed due to max lifetime, \
    consider increasing max lifetime or revising the connection usage pattern.";

/// More open connections than this counts as heavy load.
const HEAVY_LOAD_CONNECTIONS: u32 = 40;
/// More waits for a connection than this counts as a bottleneck.
const BOTTLENECK_WAIT_COUNT: u64 = 1000;

/// Whether the database is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The database answered a ping.
    Up,
    /// The database could not be reached.
    Down,
}

/// The result of a health check.
///
/// Serializes to a flat JSON object, with the pool statistics alongside the
/// status when the database is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Whether the database is reachable.
    pub status: HealthStatus,
    /// A summary of the pool's condition, present when the database is up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Why the database is unreachable, present when it is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The pool statistics, present when the database is up.
    #[serde(flatten)]
    pub stats: Option<PoolStats>,
}

impl HealthReport {
    fn up(stats: PoolStats) -> Self {
        Self {
            status: HealthStatus::Up,
            message: Some(assess(&stats).to_owned()),
            error: None,
            stats: Some(stats),
        }
    }

    fn down(error: &Error) -> Self {
        Self {
            status: HealthStatus::Down,
            message: None,
            error: Some(format!("db down: {error}")),
            stats: None,
        }
    }
}

/// Ping the database and summarise the pool.
///
/// A failed ping is logged as an error and reported as [HealthStatus::Down]
/// rather than returned, so the caller always has a report to show.
pub async fn check_health(database: &Database, deadline: Deadline) -> HealthReport {
    let ping = database
        .with_connection(deadline, |connection| {
            connection.query_row("SELECT 1;", [], |_| Ok(()))?;
            Ok(())
        })
        .await;

    match ping.and_then(|_| database.stats()) {
        Ok(stats) => HealthReport::up(stats),
        Err(error) => {
            let report = HealthReport::down(&error);
            tracing::error!("Health check failed: {error}");
            report
        }
    }
}

/// Pick the message describing `stats`.
///
/// The checks run in a fixed order and a later match replaces the message
/// from an earlier one.
fn assess(stats: &PoolStats) -> &'static str {
    let mut message = HEALTHY;
    let half_open = u64::from(stats.open_connections / 2);

    if stats.open_connections > HEAVY_LOAD_CONNECTIONS {
        message = HEAVY_LOAD;
    }

    if stats.wait_count > BOTTLENECK_WAIT_COUNT {
        message = BOTTLENECK;
    }

    if stats.max_idle_closed > half_open {
        message = IDLE_CLOSED;
    }

    if stats.max_lifetime_closed > half_open {
        message = LIFETIME_CLOSED;
    }

    message
}

/// GET /health - report database health and pool statistics.
///
/// Responds with 200 when the database is up and 503 when it is down.
pub async fn get_health(State(database): State<Database>, deadline: Deadline) -> Response {
    let report = check_health(&database, deadline).await;

    let status = match report.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report)).into_response()
}

#[cfg(test)]
mod assess_tests {
    use crate::PoolStats;

    use super::{BOTTLENECK, HEALTHY, HEAVY_LOAD, IDLE_CLOSED, LIFETIME_CLOSED, assess};

    fn stats(open_connections: u32) -> PoolStats {
        PoolStats {
            open_connections,
            idle: open_connections,
            ..Default::default()
        }
    }

    #[test]
    fn quiet_pool_is_healthy() {
        assert_eq!(assess(&stats(2)), HEALTHY);
        assert_eq!(assess(&stats(0)), HEALTHY);
    }

    #[test]
    fn many_open_connections_is_heavy_load() {
        assert_eq!(assess(&stats(40)), HEALTHY);
        assert_eq!(assess(&stats(41)), HEAVY_LOAD);
    }

    #[test]
    fn many_waits_is_a_bottleneck() {
        let stats = PoolStats {
            wait_count: 1001,
            ..stats(2)
        };

        assert_eq!(assess(&stats), BOTTLENECK);
    }

    #[test]
    fn idle_closures_compare_against_half_the_open_connections() {
        let at_threshold = PoolStats {
            max_idle_closed: 2,
            ..stats(5)
        };
        let over_threshold = PoolStats {
            max_idle_closed: 3,
            ..stats(5)
        };

        assert_eq!(assess(&at_threshold), HEALTHY);
        assert_eq!(assess(&over_threshold), IDLE_CLOSED);
    }

    #[test]
    fn lifetime_closures_compare_against_half_the_open_connections() {
        let stats = PoolStats {
            max_lifetime_closed: 1,
            ..stats(0)
        };

        assert_eq!(assess(&stats), LIFETIME_CLOSED);
    }

    #[test]
    fn later_checks_replace_earlier_messages() {
        let heavy_and_waiting = PoolStats {
            wait_count: 5000,
            ..stats(50)
        };
        let everything = PoolStats {
            wait_count: 5000,
            max_idle_closed: 100,
            max_lifetime_closed: 100,
            ..stats(50)
        };
        let all_but_lifetime = PoolStats {
            max_lifetime_closed: 0,
            ..everything
        };

        assert_eq!(assess(&heavy_and_waiting), BOTTLENECK);
        assert_eq!(assess(&all_but_lifetime), IDLE_CLOSED);
        assert_eq!(assess(&everything), LIFETIME_CLOSED);
    }
}
