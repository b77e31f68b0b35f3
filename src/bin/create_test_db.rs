use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;

use categories_rs::{Schema, create_category_table};

/// A utility for creating a test database for the categories_rs REST API server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        Some(extension) if !extension.is_empty() => {}
        _ => {
            eprintln!("Output path must include a file extension (e.g., 'categories.db').");
            exit(1);
        }
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    create_category_table(&conn, &Schema::default())?;

    println!("Creating test category...");

    conn.execute(
        "INSERT INTO category (nome, quantidade, limite) VALUES (?1, ?2, ?3)",
        ("Item A", 15.75, 200),
    )?;

    println!("Success!");

    Ok(())
}
