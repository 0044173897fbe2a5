//! l2tpctl - L2TP/IPsec VPN connector
//!
//! Connects a CI runner to an L2TP/IPsec VPN and routes its traffic through
//! the tunnel. Credentials come from flags or from the `INPUT_*` environment
//! variables CI actions export.
//!
//! # Usage
//!
//! ```bash
//! # Connect using action inputs
//! INPUT_SERVER=vpn.example.com INPUT_USERNAME=ci INPUT_PASSWORD=... INPUT_PSK=... l2tpctl connect
//!
//! # Inspect the generated configuration without touching the system
//! l2tpctl render --output-dir ./l2tp --server 203.0.113.5 --username ci --password x --psk y
//! ```

use clap::{Args, Parser, Subcommand};
use libl2tpctl::{render, Credentials, L2tpConfig, L2tpResult, SystemCommandRunner, VpnSession};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "l2tpctl")]
#[command(version)]
#[command(about = "Connect to an L2TP/IPsec VPN and route traffic through it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install packages, start the tunnel and route through it
    Connect {
        #[command(flatten)]
        creds: CredentialArgs,

        /// Do not install strongswan/xl2tpd/ppp
        #[arg(long)]
        skip_install: bool,

        /// Seconds to wait for the tunnel
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Milliseconds between readiness checks
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Write the generated configuration into a directory
    Render {
        #[command(flatten)]
        creds: CredentialArgs,

        /// Directory to write into
        #[arg(short, long)]
        output_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CredentialArgs {
    /// VPN server address or hostname
    #[arg(long, env = "INPUT_SERVER")]
    server: Option<String>,

    /// L2TP (PPP) username
    #[arg(long, env = "INPUT_USERNAME", hide_env_values = true)]
    username: Option<String>,

    /// L2TP (PPP) password
    #[arg(long, env = "INPUT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// IPsec pre-shared key
    #[arg(long, env = "INPUT_PSK", hide_env_values = true)]
    psk: Option<String>,
}

impl CredentialArgs {
    fn into_credentials(self) -> L2tpResult<Credentials> {
        Credentials::new(
            self.server.unwrap_or_default(),
            self.username.unwrap_or_default(),
            self.password.unwrap_or_default(),
            self.psk.unwrap_or_default(),
        )
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli);

    let result = match load_config(&cli) {
        Ok(config) => match cli.command {
            Commands::Connect {
                creds,
                skip_install,
                timeout_secs,
                interval_ms,
            } => handle_connect(config, creds, skip_install, timeout_secs, interval_ms).await,
            Commands::Render { creds, output_dir } => handle_render(config, creds, output_dir).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> L2tpResult<L2tpConfig> {
    match &cli.config {
        Some(path) => {
            debug!("Loading configuration from {:?}", path);
            L2tpConfig::load(path)
        }
        None => Ok(L2tpConfig::default()),
    }
}

async fn handle_connect(
    mut config: L2tpConfig,
    creds: CredentialArgs,
    skip_install: bool,
    timeout_secs: Option<u64>,
    interval_ms: Option<u64>,
) -> L2tpResult<()> {
    let creds = creds.into_credentials()?;

    if skip_install {
        config.install.skip = true;
    }
    if let Some(secs) = timeout_secs {
        config.poll.timeout_ms = secs.saturating_mul(1_000);
    }
    if let Some(ms) = interval_ms {
        config.poll.interval_ms = ms;
    }

    let server = creds.server().to_string();
    let session = VpnSession::new(&config, creds, Arc::new(SystemCommandRunner::new()))?;
    let outcome = session.establish().await?;

    println!("Connected to {} through {}", server, config.tunnel.tunnel_interface);
    for route in &outcome.routes {
        println!("  route: {}", route);
    }
    if !outcome.resolver_linked {
        println!("  warning: DNS resolver was not switched to {:?}", config.paths.resolv_conf);
    }
    Ok(())
}

async fn handle_render(config: L2tpConfig, creds: CredentialArgs, output_dir: PathBuf) -> L2tpResult<()> {
    let creds = creds.into_credentials()?;
    let written = render(&config, &creds, &output_dir).await?;

    println!("Wrote {} files to {}", written.len(), output_dir.display());
    for path in &written {
        println!("  {}", path.display());
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("l2tpctl={},libl2tpctl={}", log_level, log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}
