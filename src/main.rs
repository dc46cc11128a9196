use std::path::PathBuf;

use clap::Parser;

use tamper_proxy::config::{self, ProxyConfig};
use tamper_proxy::lifecycle::{signals, Shutdown};
use tamper_proxy::net::Listener;
use tamper_proxy::observability::logging;
use tamper_proxy::TamperServer;

/// Proxies requests and tampers with responses in supposedly-acceptable ways.
#[derive(Parser, Debug)]
#[command(name = "tamper-proxy", version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen on the host HOST ("*" for all interfaces)
    #[arg(long, value_name = "HOST")]
    listen_host: Option<String>,

    /// Listen on the port PORT
    #[arg(long, value_name = "PORT")]
    listen_port: Option<u16>,

    /// Proxy to the host HOST
    #[arg(long, value_name = "HOST")]
    dest_host: Option<String>,

    /// Proxy to the port PORT
    #[arg(long, value_name = "PORT")]
    dest_port: Option<u16>,

    /// Apply at most N filters per response
    #[arg(long, value_name = "N")]
    max_filters: Option<usize>,

    /// Apply filters in catalog order instead of a random order
    #[arg(long)]
    retain_order: bool,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if self.listen_host.is_some() || self.listen_port.is_some() {
            let (current_host, current_port) = split_bind_address(&config.listener.bind_address);
            let host = match self.listen_host.as_deref() {
                Some("*") => "0.0.0.0".to_string(),
                Some(host) => host.to_string(),
                None => current_host,
            };
            let port = self.listen_port.unwrap_or(current_port);
            config.listener.bind_address = if host.contains(':') {
                format!("[{host}]:{port}")
            } else {
                format!("{host}:{port}")
            };
        }
        if let Some(host) = &self.dest_host {
            config.upstream.host = host.clone();
        }
        if let Some(port) = self.dest_port {
            config.upstream.port = port;
        }
        if let Some(max) = self.max_filters {
            config.tamper.max_filters = max;
        }
        if self.retain_order {
            config.tamper.retain_order = true;
        }
    }
}

fn split_bind_address(address: &str) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) => (
            host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port.parse().unwrap_or(4080),
        ),
        None => (address.to_string(), 4080),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!("tamper-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address(),
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let server = TamperServer::new(&config)?;
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_flags_override_defaults() {
        let cli = Cli::parse_from([
            "tamper-proxy",
            "--listen-host",
            "*",
            "--listen-port",
            "9000",
            "--dest-host",
            "127.0.0.1",
            "--dest-port",
            "8000",
            "--retain-order",
        ]);
        let mut config = ProxyConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
        assert_eq!(config.upstream.address(), "127.0.0.1:8000");
        assert!(config.tamper.retain_order);
        assert!(config::validate_config(&config).is_ok());
    }

    #[test]
    fn port_only_keeps_configured_host() {
        let cli = Cli::parse_from(["tamper-proxy", "--listen-port", "5000"]);
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:4080".into();
        cli.apply(&mut config);
        assert_eq!(config.listener.bind_address, "127.0.0.1:5000");
    }

    #[test]
    fn no_flags_leave_config_untouched() {
        let cli = Cli::parse_from(["tamper-proxy"]);
        let mut config = ProxyConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, ProxyConfig::default());
    }
}
