//! CLI binary for office-convert.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables onto `ServiceConfig`, installs logging and serves the router
//! until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use office_convert::{router, AppState, CommandTemplate, Converter, ServiceConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default address with the default converters
  office-convert

  # Custom temp directory, 20 MiB ceiling, 2 minute converter deadline
  office-convert --tmp-dir /var/tmp/office-convert --max-file-size 20971520 --timeout 120

  # Use LibreOffice instead of Wordconv for .doc → .docx
  office-convert --doc-converter "soffice --headless --convert-to docx --outdir {output} {input}"

ENDPOINTS:
  GET  /              {"message":"ok"}
  GET  /ping          {"ping":"pong"}
  GET  /health_check  {"status":true}
  POST /convert       multipart field `file` (.doc)  → .docx
  POST /docx2pdf      multipart field `file` (.docx) → .pdf

ENVIRONMENT VARIABLES:
  TMP_DIR         Directory for per-request artifacts (created at startup)
  MAX_FILE_SIZE   Upload ceiling in bytes
  TIMEOUT         Converter deadline in seconds
  BIND_ADDRESS    Listen address
  DOC_CONVERTER   Command template for .doc → .docx
  PDF_CONVERTER   Command template for .docx → .pdf
  LOG_LEVEL       Log filter when RUST_LOG is unset
  LOG_JSON        Emit logs as JSON lines

  Command templates are whitespace-separated and must contain both {input}
  and {output}; each is replaced by the artifact path for the request.
"#;

/// Convert Word documents over HTTP using external converters.
#[derive(Parser, Debug)]
#[command(
    name = "office-convert",
    version,
    about = "Convert Word documents over HTTP using external converters",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long = "bind", env = "BIND_ADDRESS", default_value = "0.0.0.0:8000")]
    bind_address: SocketAddr,

    /// Directory for per-request temp artifacts.
    #[arg(long, env = "TMP_DIR", default_value = "tmp/")]
    tmp_dir: PathBuf,

    /// Maximum upload size in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = office_convert::config::DEFAULT_MAX_UPLOAD_BYTES)]
    max_file_size: u64,

    /// Converter deadline in seconds.
    #[arg(long, env = "TIMEOUT", default_value_t = office_convert::config::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Command template for .doc → .docx.
    #[arg(long, env = "DOC_CONVERTER")]
    doc_converter: Option<String>,

    /// Command template for .docx → .pdf.
    #[arg(long, env = "PDF_CONVERTER")]
    pdf_converter: Option<String>,

    /// Log filter used when RUST_LOG is unset (e.g. info, debug, office_convert=trace).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("Invalid log level '{}'", cli.log_level))?;
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "office-convert starting");

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = ServiceConfig::builder()
        .temp_dir(&cli.tmp_dir)
        .max_upload_bytes(cli.max_file_size)
        .timeout_secs(cli.timeout);
    if let Some(ref template) = cli.doc_converter {
        builder = builder.doc_converter(
            CommandTemplate::parse(template).context("Invalid --doc-converter")?,
        );
    }
    if let Some(ref template) = cli.pdf_converter {
        builder = builder.pdf_converter(
            CommandTemplate::parse(template).context("Invalid --pdf-converter")?,
        );
    }
    let config = builder.build().context("Invalid configuration")?;
    info!(
        doc_converter = %config.doc_converter,
        pdf_converter = %config.pdf_converter,
        "Converters configured"
    );

    // ── Serve ────────────────────────────────────────────────────────────
    let converter = Converter::new(config)
        .await
        .with_context(|| format!("Failed to prepare temp directory {}", cli.tmp_dir.display()))?;
    let app = router(AppState::new(converter));

    let listener = tokio::net::TcpListener::bind(cli.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind_address))?;
    info!(addr = %cli.bind_address, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("office-convert stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received; draining in-flight requests");
}
