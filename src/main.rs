//! Tideway demo and stress runner.
//!
//! Drives in-process replica meshes through the anti-entropy engine and
//! reports convergence statistics.

use tracing_subscriber::EnvFilter;


use stress_test::{stress_awlwwmap, stress_orset};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("quick") | None => rt.block_on(run_quick()),
        Some("full") => rt.block_on(run_full()),
        Some("help") | Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            println!("Unknown run: {other}");
            print_usage();
        }
    }
}

fn print_usage() {
    println!("Tideway stress runner");
    println!();
    println!("Usage: cargo run [quick|full|help]");
    println!();
    println!("  quick  - small meshes, fast smoke run (default)");
    println!("  full   - larger meshes and heavier op counts");
}

async fn run_quick() {
    stress_orset(3, 100).await.print();
    stress_awlwwmap(3, 100).await.print();
}

async fn run_full() {
    stress_orset(5, 1_000).await.print();
    stress_awlwwmap(5, 1_000).await.print();
    stress_orset(10, 2_000).await.print();
}
