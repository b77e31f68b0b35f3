use std::{
    fs::OpenOptions,
    net::{IpAddr, SocketAddr},
    process::exit,
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use tower_http::trace::TraceLayer;

use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use categories_rs::{
    AppState, Database, DatabaseConfig, Deadline, build_router, create_category_table,
    graceful_shutdown,
};

/// The REST API server for categories_rs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    database: DatabaseConfig,

    /// The address to listen on.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Seconds a request may take before it is abandoned.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine, the variables may be set some other way.
    let _ = dotenvy::dotenv();

    setup_logging();

    let args = Args::parse();

    let addr = SocketAddr::new(args.host, args.port);

    let database = match Database::open(&args.database) {
        Ok(database) => database,
        Err(error) => {
            tracing::error!("Could not open the database: {error}");
            exit(1);
        }
    };

    let schema = args.database.schema.clone();
    if let Err(error) = database
        .with_connection(Deadline::after(Duration::from_secs(5)), move |connection| {
            create_category_table(connection, &schema)
        })
        .await
    {
        tracing::error!("Could not create the category table: {error}");
        exit(1);
    }

    let state = AppState::new(database.clone())
        .with_request_timeout(Duration::from_secs(args.request_timeout_secs));

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state));

    tracing::info!("HTTP server listening on {}", addr);
    let result = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await;

    if let Err(error) = database.close() {
        tracing::error!("Could not close the database: {error}");
    }

    if let Err(error) = result {
        tracing::error!("Server error: {error}");
        exit(1);
    }
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but errors are
        // logged where they happen, so disable that.
        .on_failure(());

    router.layer(tracing_layer)
}
