//! # Page Studio
//!
//! Command-line renderer and local server for Page Studio documents.
//! The server binds to localhost only.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use studio_core::{PageDocument, Params, RenderMode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use studio_server::{default_registry, render_document, router, AppState, DEFAULT_PORT};

/// Page Studio command line.
#[derive(Debug, Parser)]
#[command(name = "page-studio", version, about)]
struct Cli {
    /// Base URL for image assets.
    #[arg(long, env = "STUDIO_IMAGE_BASE_URL", default_value = "", global = true)]
    image_base_url: String,

    /// Base URL for every other asset.
    #[arg(long, env = "STUDIO_ASSET_BASE_URL", default_value = "", global = true)]
    asset_base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render one page and print it.
    Render {
        /// Document JSON file.
        #[arg(long)]
        document: PathBuf,
        /// Page id; defaults to the home page.
        #[arg(long)]
        page: Option<String>,
        /// `preview` or `design`.
        #[arg(long, default_value_t = RenderMode::Preview)]
        mode: RenderMode,
        /// Print HTML instead of the JSON tree.
        #[arg(long)]
        html: bool,
    },
    /// Serve a document over HTTP and WebSocket.
    Serve {
        /// Port to listen on.
        #[arg(long, env = "STUDIO_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Document JSON file.
        #[arg(long)]
        document: PathBuf,
    },
}

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,studio_server=debug,tower_http=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,studio_server=debug,tower_http=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn load_document(path: &Path) -> anyhow::Result<PageDocument> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    PageDocument::from_json(&json)
        .with_context(|| format!("Failed to parse document {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let params = Params::new(cli.image_base_url, cli.asset_base_url);

    match cli.command {
        Command::Render {
            document,
            page,
            mode,
            html,
        } => {
            let document = load_document(&document)?;
            let (page, output) =
                render_document(default_registry(), document, params, page.as_deref(), mode)?;
            for error in &output.errors {
                tracing::warn!(page = %page, "{}", error);
            }
            if html {
                println!("{}", output.root.to_html());
            } else {
                println!("{}", serde_json::to_string_pretty(&output.root)?);
            }
        }
        Command::Serve { port, document } => {
            let document = load_document(&document)?;
            let app = router(AppState::new(document, params), port);

            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("Page Studio server starting on http://{}", addr);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
