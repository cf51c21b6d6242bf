pub mod auth;
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod format;
pub mod model;
pub mod patch;
pub mod preview;
pub mod print;
pub mod settings;
pub mod totals;

use clap::Parser;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub use config::AppConfig;
pub use editor::EditorSession;
pub use error::{AppError, Result};
pub use model::{Document, DocumentKind, Item, Layer, Signature};
pub use print::{print_element, PrintBackend, PrintOptions, PrintStatus};
pub use settings::{MemoryStore, SettingsStore, SqliteStore};

/// Log filter directives, e.g. `info` or `invoice_builder_lib=debug,print=trace`.
pub const ENV_LOG: &str = "INVOICE_BUILDER_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn run() -> anyhow::Result<()> {
    init_tracing();
    let cli = cli::Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(cli::execute(cli))
}
