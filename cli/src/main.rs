//! aircast - stream loopback audio to the local network.
//!
//! Subcommands:
//! - `aircast list-endpoints` - List capture endpoints
//! - `aircast serve` - Run the streaming server until Ctrl-C

use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use aircast_capture::{CaptureBackend, CaptureConfig, SampleEncoding, ToneCapture};
use aircast_protocol::DEFAULT_PORT;
use aircast_server::{local_addresses, Server};

#[derive(Parser)]
#[command(name = "aircast")]
#[command(about = "Stream loopback audio to the local network")]
#[command(version)]
struct Cli {
    /// Set log level to trace
    #[arg(short = 'V', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture endpoints
    ListEndpoints,

    /// Run the streaming server
    Serve {
        /// Bind address as <host>[:<port>]; the default port is 65530
        #[arg(short, long)]
        bind: Option<String>,

        /// Capture endpoint id; uses the default endpoint when omitted
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Sample encoding: f32, s16, s24, s32 or u8
        #[arg(long, default_value = "f32")]
        encoding: String,

        /// Channel count
        #[arg(long, default_value_t = 2)]
        channels: u16,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::ListEndpoints => list_endpoints(),
        Commands::Serve {
            bind,
            endpoint,
            encoding,
            channels,
            sample_rate,
        } => serve(bind, endpoint, &encoding, channels, sample_rate),
    }
}

fn list_endpoints() -> Result<()> {
    let backend = ToneCapture::new();
    let endpoints = backend
        .list_endpoints()
        .context("failed to enumerate capture endpoints")?;

    println!("endpoints:");
    for endpoint in &endpoints {
        let marker = if endpoint.is_default { '*' } else { ' ' };
        println!("\t{} id: {:8} name: {}", marker, endpoint.id, endpoint.name);
    }
    println!("total: {}", endpoints.len());
    Ok(())
}

fn serve(
    bind: Option<String>,
    endpoint: Option<String>,
    encoding: &str,
    channels: u16,
    sample_rate: u32,
) -> Result<()> {
    let (host, port) = parse_bind(bind.as_deref())?;

    let config = CaptureConfig {
        endpoint_id: endpoint,
        encoding: parse_encoding(encoding)?,
        channels,
        sample_rate,
    };

    let server = Arc::new(Server::new(Box::new(ToneCapture::new())));
    server.start(&host, port, &config)?;

    if host == Ipv4Addr::UNSPECIFIED.to_string() {
        let addresses = local_addresses();
        if !addresses.is_empty() {
            println!("reachable on:");
            for addr in addresses {
                println!("\t{addr}:{port}");
            }
        }
    }
    println!("serving on {host}:{port}, press Ctrl-C to stop");

    // The server owns its own runtime; this one only waits for the signal.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
        error!(error = %e, "Signal wait failed");
    }

    server.stop();
    Ok(())
}

fn parse_bind(bind: Option<&str>) -> Result<(String, u16)> {
    let Some(bind) = bind else {
        return Ok((Ipv4Addr::UNSPECIFIED.to_string(), DEFAULT_PORT));
    };

    match bind.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                bail!("bind address has no host: {bind}");
            }
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in bind address: {bind}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((bind.to_string(), DEFAULT_PORT)),
    }
}

fn parse_encoding(encoding: &str) -> Result<SampleEncoding> {
    match encoding.to_ascii_lowercase().as_str() {
        "f32" => Ok(SampleEncoding::F32),
        "s16" => Ok(SampleEncoding::S16),
        "s24" => Ok(SampleEncoding::S24),
        "s32" => Ok(SampleEncoding::S32),
        "u8" => Ok(SampleEncoding::U8),
        other => bail!("unknown encoding: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind() {
        assert_eq!(parse_bind(None).unwrap(), ("0.0.0.0".to_string(), 65530));
        assert_eq!(
            parse_bind(Some("192.168.1.2")).unwrap(),
            ("192.168.1.2".to_string(), 65530)
        );
        assert_eq!(
            parse_bind(Some("192.168.1.2:4000")).unwrap(),
            ("192.168.1.2".to_string(), 4000)
        );
        assert!(parse_bind(Some(":4000")).is_err());
        assert!(parse_bind(Some("host:notaport")).is_err());
    }

    #[test]
    fn test_parse_encoding() {
        assert_eq!(parse_encoding("f32").unwrap(), SampleEncoding::F32);
        assert_eq!(parse_encoding("S16").unwrap(), SampleEncoding::S16);
        assert!(parse_encoding("mp3").is_err());
    }
}
