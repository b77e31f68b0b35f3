//! The pooled database connection shared by every storage operation.
//!
//! A [Database] is opened once at startup and handed to whatever needs
//! storage. Operations borrow a connection through
//! [Database::with_connection], which runs the blocking SQLite work off the
//! async runtime and bounds it by the caller's [Deadline].

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use r2d2::{Pool, PooledConnection, event::HandleEvent, event::ReleaseEvent};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, InterruptHandle};
use serde::{Serialize, Serializer};

use crate::{DatabaseConfig, Deadline, Error, Schema};

/// The longest a single storage operation may take, however much time the request has left.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(1);

/// How long opening the pool may take before startup fails.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the connection manager for `config`.
///
/// For the main schema connections open the database file directly. For any
/// other schema each connection opens a private in-memory main database and
/// attaches the file under the schema's name.
fn connection_manager(config: &DatabaseConfig) -> SqliteConnectionManager {
    let schema = config.schema.clone();
    let path = config.database.to_string_lossy().into_owned();

    let manager = if schema.is_main() {
        SqliteConnectionManager::file(&config.database)
    } else {
        SqliteConnectionManager::file(":memory:")
    };

    manager.with_init(move |connection| {
        if !schema.is_main() {
            connection.execute(
                &format!("ATTACH DATABASE ?1 AS {}", schema.quoted()),
                (path.as_str(),),
            )?;
        }

        enable_wal(connection, &schema)
    })
}

fn enable_wal(connection: &Connection, schema: &Schema) -> Result<(), rusqlite::Error> {
    // Journal mode pragmas report the new mode as a row.
    connection.query_row(
        &format!("PRAGMA {}.journal_mode = WAL;", schema.quoted()),
        [],
        |_| Ok(()),
    )
}

/// Counters the pool itself does not keep.
#[derive(Debug, Default)]
struct PoolMetrics {
    wait_count: AtomicU64,
    wait_duration_nanos: AtomicU64,
    max_idle_closed: AtomicU64,
    max_lifetime_closed: AtomicU64,
}

impl PoolMetrics {
    fn record_wait(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);

        self.wait_count.fetch_add(1, Ordering::Relaxed);
        self.wait_duration_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

/// Sorts connections closed by the pool into idle and lifetime evictions.
#[derive(Debug)]
struct EvictionCounter {
    metrics: Arc<PoolMetrics>,
    max_lifetime: Option<Duration>,
}

impl EvictionCounter {
    /// Count a closed connection that lived for `age`.
    ///
    /// The pool does not say why it closed a connection. One that reached the
    /// maximum lifetime counts as a lifetime closure, anything else as idle.
    fn record_release(&self, age: Duration) {
        let counter = match self.max_lifetime {
            Some(max_lifetime) if age >= max_lifetime => &self.metrics.max_lifetime_closed,
            _ => &self.metrics.max_idle_closed,
        };

        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl HandleEvent for EvictionCounter {
    fn handle_release(&self, event: ReleaseEvent) {
        self.record_release(event.age());
    }
}

/// A point-in-time snapshot of the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Connections currently open, in use or idle.
    pub open_connections: u32,
    /// Connections currently handed out to an operation.
    pub in_use: u32,
    /// Connections open but not in use.
    pub idle: u32,
    /// The number of times an operation had to wait for a connection.
    pub wait_count: u64,
    /// The total time spent waiting for a connection, e.g. "0s" or "1.5ms".
    #[serde(serialize_with = "serialize_duration")]
    pub wait_duration: Duration,
    /// Connections closed after sitting idle too long.
    pub max_idle_closed: u64,
    /// Connections closed after reaching their maximum lifetime.
    pub max_lifetime_closed: u64,
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

/// Format `duration` with the largest fitting unit, e.g. "0s", "250µs",
/// "1.5ms" or "1h2m3.5s".
fn format_duration(duration: Duration) -> String {
    const MICRO: u128 = 1_000;
    const MILLI: u128 = 1_000_000;
    const SECOND: u128 = 1_000_000_000;

    let nanos = duration.as_nanos();

    if nanos == 0 {
        return "0s".to_owned();
    }

    if nanos < MICRO {
        return format!("{nanos}ns");
    }

    if nanos < MILLI {
        return format!("{}µs", decimal(nanos, MICRO));
    }

    if nanos < SECOND {
        return format!("{}ms", decimal(nanos, MILLI));
    }

    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = total_seconds / 60 % 60;
    let seconds = decimal(nanos % (60 * SECOND), SECOND);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `value / unit` as a decimal without trailing zeros. `unit` is a power of ten.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let fraction = value % unit;

    if fraction == 0 {
        return whole.to_string();
    }

    let width = unit.ilog10() as usize;
    let digits = format!("{fraction:0width$}");

    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// A handle to the connection pool.
///
/// Cloning is cheap and every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Arc<RwLock<Option<Pool<SqliteConnectionManager>>>>,
    metrics: Arc<PoolMetrics>,
}

impl Database {
    /// Open a connection pool for the database described by `config`.
    ///
    /// Connections are only closed for being idle or old when
    /// `config` sets an idle timeout or maximum lifetime.
    ///
    /// # Errors
    /// Returns an error if the pool cannot open its initial connections.
    pub fn open(config: &DatabaseConfig) -> Result<Self, Error> {
        let metrics = Arc::new(PoolMetrics::default());
        let idle_timeout = config.idle_timeout().filter(|timeout| !timeout.is_zero());
        let max_lifetime = config.max_lifetime().filter(|lifetime| !lifetime.is_zero());

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_idle.min(config.max_connections)))
            .idle_timeout(idle_timeout)
            .max_lifetime(max_lifetime)
            .connection_timeout(STARTUP_TIMEOUT)
            .event_handler(Box::new(EvictionCounter {
                metrics: metrics.clone(),
                max_lifetime,
            }))
            .build(connection_manager(config))?;

        tracing::info!(
            "Connected to database {} (schema {}, max connections {})",
            config.database.display(),
            config.schema,
            config.max_connections
        );

        Ok(Self {
            pool: Arc::new(RwLock::new(Some(pool))),
            metrics,
        })
    }

    /// Release the pool.
    ///
    /// Idle connections are closed straight away, connections still in use
    /// are closed when their operation finishes. Every later operation fails
    /// with [Error::DatabaseClosed].
    ///
    /// # Errors
    /// Returns an error if the pool lock is poisoned.
    pub fn close(&self) -> Result<(), Error> {
        let pool = self
            .pool
            .write()
            .map_err(|_| Error::DatabaseLockError)?
            .take();

        if pool.is_some() {
            tracing::info!("Disconnected from database");
        }

        Ok(())
    }

    /// Take a snapshot of the pool statistics.
    ///
    /// # Errors
    /// Returns [Error::DatabaseClosed] if the pool has been closed.
    pub fn stats(&self) -> Result<PoolStats, Error> {
        let state = self.pool()?.state();

        Ok(PoolStats {
            open_connections: state.connections,
            in_use: state.connections.saturating_sub(state.idle_connections),
            idle: state.idle_connections,
            wait_count: self.metrics.wait_count.load(Ordering::Relaxed),
            wait_duration: Duration::from_nanos(
                self.metrics.wait_duration_nanos.load(Ordering::Relaxed),
            ),
            max_idle_closed: self.metrics.max_idle_closed.load(Ordering::Relaxed),
            max_lifetime_closed: self.metrics.max_lifetime_closed.load(Ordering::Relaxed),
        })
    }

    /// Run `operation` with a pooled connection.
    ///
    /// The operation gets at most [OPERATION_TIMEOUT], less if `deadline` is
    /// closer. The same budget bounds waiting for a free connection and
    /// waiting on SQLite locks. If the budget runs out, or the returned
    /// future is dropped because the request went away, a running statement
    /// is interrupted and an operation that has not started yet never runs.
    ///
    /// # Errors
    /// Returns [Error::Timeout] when the budget runs out, [Error::DatabaseClosed]
    /// after [Database::close], or whatever error `operation` returns.
    pub async fn with_connection<T, F>(&self, deadline: Deadline, operation: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let budget = deadline.budget(OPERATION_TIMEOUT)?;
        let pool = self.pool()?;
        let metrics = self.metrics.clone();

        let cancellation = Arc::new(Cancellation::default());
        let mut guard = CancelOnDrop {
            cancellation: cancellation.clone(),
            armed: true,
        };

        let task = tokio::task::spawn_blocking(move || {
            run_operation(&pool, &metrics, budget, &cancellation, operation)
        });

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(result)) => {
                guard.armed = false;
                result
            }
            Ok(Err(error)) => {
                guard.armed = false;
                Err(Error::TaskFailed(error.to_string()))
            }
            Err(_) => {
                tracing::error!("database operation exceeded its {budget:?} budget");
                Err(Error::Timeout)
            }
        }
    }

    fn pool(&self) -> Result<Pool<SqliteConnectionManager>, Error> {
        self.pool
            .read()
            .map_err(|_| Error::DatabaseLockError)?
            .clone()
            .ok_or(Error::DatabaseClosed)
    }
}

/// Borrow a connection and run `operation` on it unless the caller has
/// already given up.
fn run_operation<T, F>(
    pool: &Pool<SqliteConnectionManager>,
    metrics: &PoolMetrics,
    budget: Duration,
    cancellation: &Cancellation,
    operation: F,
) -> Result<T, Error>
where
    F: FnOnce(&Connection) -> Result<T, Error>,
{
    let connection = acquire(pool, metrics, budget)?;
    connection.busy_timeout(budget)?;

    // Dropped before `connection` goes back to the pool.
    let _registration = cancellation.register(connection.get_interrupt_handle())?;

    operation(&connection)
}

/// Take a connection from `pool`, counting the acquisition as a wait when
/// every connection is busy and the pool cannot grow.
fn acquire(
    pool: &Pool<SqliteConnectionManager>,
    metrics: &PoolMetrics,
    timeout: Duration,
) -> Result<PooledConnection<SqliteConnectionManager>, Error> {
    let state = pool.state();
    let must_wait = state.idle_connections == 0 && state.connections >= pool.max_size();

    let started = Instant::now();
    let connection = pool.get_timeout(timeout);

    if must_wait {
        metrics.record_wait(started.elapsed());
    }

    Ok(connection?)
}

/// Shared between a waiting caller and the blocking task running its operation.
#[derive(Default)]
struct Cancellation {
    state: Mutex<CancellationState>,
}

#[derive(Default)]
struct CancellationState {
    cancelled: bool,
    interrupt: Option<InterruptHandle>,
}

impl Cancellation {
    fn lock(&self) -> MutexGuard<'_, CancellationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the handle for the connection about to run the operation.
    ///
    /// Fails with [Error::Timeout] if the caller has already cancelled.
    fn register(&self, interrupt: InterruptHandle) -> Result<Registration<'_>, Error> {
        let mut state = self.lock();

        if state.cancelled {
            tracing::debug!("Skipping database operation cancelled before it started");
            return Err(Error::Timeout);
        }

        state.interrupt = Some(interrupt);

        Ok(Registration(self))
    }

    /// Stop the operation: interrupt it if it is running, skip it if not.
    fn cancel(&self) {
        let mut state = self.lock();
        state.cancelled = true;

        if let Some(interrupt) = state.interrupt.take() {
            tracing::debug!("Interrupting database operation");
            interrupt.interrupt();
        }
    }
}

/// Forgets the interrupt handle once the operation finishes, so a late
/// cancellation cannot interrupt the connection's next borrower.
struct Registration<'a>(&'a Cancellation);

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.0.lock().interrupt = None;
    }
}

/// Cancels the operation when dropped unless disarmed.
struct CancelOnDrop {
    cancellation: Arc<Cancellation>,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancellation.cancel();
        }
    }
}


#[cfg(test)]
mod format_duration_tests {
    use std::time::Duration;

    use super::format_duration;

    #[test]
    fn zero_is_zero_seconds() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn sub_second_durations_use_smallest_fitting_unit() {
        assert_eq!(format_duration(Duration::from_nanos(999)), "999ns");
        assert_eq!(format_duration(Duration::from_nanos(1_500)), "1.5µs");
        assert_eq!(format_duration(Duration::from_millis(3)), "3ms");
        assert_eq!(format_duration(Duration::from_nanos(248_706_007)), "248.706007ms");
    }

    #[test]
    fn longer_durations_use_hours_minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3_600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_millis(3_661_500)), "1h1m1.5s");
    }
}
