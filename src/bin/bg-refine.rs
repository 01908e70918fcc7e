//! bg-refine CLI
//!
//! Command-line interface for refining background-removal masks and writing
//! transparent images with the bg-refine library.

#[cfg(feature = "cli")]
use bg_refine::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
