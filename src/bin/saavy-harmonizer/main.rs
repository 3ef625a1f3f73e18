//! saavy-harmonizer - realtime harmonizer demo
//!
//! Run with: cargo run
//! Log with: RUST_LOG=saavy_harmonizer=debug cargo run

mod app;
mod script;

use app::Demo;
use tracing_subscriber::EnvFilter;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // A sung A3, harmonised through a short progression
    Demo::new()
        .input_hz(220.0)
        .chord_seconds(2.0)
        .chord(&[57, 61, 64])
        .chord(&[57, 62, 65])
        .chord(&[55, 59, 62, 65])
        .chord(&[57, 60, 64, 69])
        .run()
}
