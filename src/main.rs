//! `nhacpd` - serve disk images to a NABU over NHACP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use nhacp_server::error::NhacpError;
use nhacp_server::transport::{SerialPort, TcpServer};
use nhacp_server::{Server, SessionEnd, DEFAULT_MAX_IDLE_TIMEOUTS};

#[derive(Parser)]
#[command(name = "nhacpd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Serial device the adapter is attached to; must already be in raw mode
    /// (e.g. `stty -F /dev/ttyUSB1 raw -echo 115200`)
    #[arg(short, long, env = "NHACP_TTY", default_value = "/dev/ttyUSB1")]
    tty: PathBuf,

    /// Serve over TCP on this address instead of the serial device
    #[arg(short, long, env = "NHACP_LISTEN")]
    listen: Option<SocketAddr>,

    /// Directory storage URLs resolve under
    #[arg(short, long, env = "NHACP_ROOT", default_value = ".")]
    root: PathBuf,

    /// Accept write requests
    #[arg(long, env = "NHACP_ALLOW_WRITES")]
    allow_writes: bool,

    /// Per-read timeout in milliseconds
    #[arg(long, env = "NHACP_TIMEOUT_MS", default_value = "1000")]
    timeout_ms: u64,

    /// Consecutive read timeouts before a silent client is dropped (0 = never)
    #[arg(long, env = "NHACP_MAX_IDLE_TIMEOUTS", default_value_t = DEFAULT_MAX_IDLE_TIMEOUTS)]
    max_idle_timeouts: u32,

    /// Number of descriptors per session
    #[arg(long, env = "NHACP_DESCRIPTORS", default_value = "8",
          value_parser = clap::value_parser!(u16).range(1..=256))]
    descriptors: u16,

    /// Adapter name reported to the client
    #[arg(long, env = "NHACP_ADAPTER_NAME", default_value = "NABU-ADAPTOR-1.1")]
    adapter_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NHACP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Storage root {} is not accessible", cli.root.display()))?;

    let server = Server::builder()
        .storage_root(root)
        .read_timeout(Duration::from_millis(cli.timeout_ms))
        .max_idle_timeouts((cli.max_idle_timeouts > 0).then_some(cli.max_idle_timeouts))
        .max_descriptors(cli.descriptors as usize)
        .allow_writes(cli.allow_writes)
        .adapter_name(cli.adapter_name.clone())
        .build();

    match cli.listen {
        Some(addr) => serve_tcp(&server, addr).await,
        None => serve_serial(&server, &cli.tty).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

/// Run sessions back to back on the serial device until it goes away.
async fn serve_serial(server: &Server, tty: &Path) -> Result<()> {
    let mut port = SerialPort::open(tty)
        .await
        .with_context(|| format!("Failed to open {}", tty.display()))?;

    tracing::info!(tty = %tty.display(), "serving on serial device");

    loop {
        let (reader, writer) = port.halves();
        match server.serve(reader, writer).await {
            Ok(SessionEnd::Goodbye) => continue,
            Ok(SessionEnd::Disconnected) => {
                tracing::info!("serial device closed");
                return Ok(());
            }
            Err(NhacpError::Timeout(_)) => continue,
            Err(e) => return Err(e).context("Serial session failed"),
        }
    }
}

/// Accept TCP clients one at a time.
async fn serve_tcp(server: &Server, addr: SocketAddr) -> Result<()> {
    let listener = TcpServer::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {}", addr))?;

    tracing::info!(addr = %listener.local_addr()?, "serving on TCP");

    loop {
        let (reader, writer, peer) = listener.accept().await.context("Accept failed")?;
        tracing::info!(%peer, "client connected");

        if let Err(e) = server.serve(reader, writer).await {
            tracing::warn!(%peer, error = %e, "client session failed");
        }
    }
}
