use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use picofan_server::{
    AccessPointConfig, DeviceContext, HostDevice, ManagementService, ProvisioningService, Radio,
    Server, ServerConfig, SimulatedRadio,
};

/// PicoFan network control plane, with a directory standing in for flash.
#[derive(Debug, Parser)]
#[command(name = "picofan", version)]
struct Args {
    /// Directory used as the device filesystem.
    #[arg(long, env = "PICOFAN_ROOT", default_value = "data")]
    root: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "PICOFAN_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(long, env = "PICOFAN_HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// Used instead of the HTTP port when cert.der and key.der exist.
    #[arg(long, env = "PICOFAN_HTTPS_PORT", default_value_t = 8443)]
    https_port: u16,

    /// Seconds between a settings, upload or deletion response and the restart.
    #[arg(long, env = "PICOFAN_REBOOT_DELAY", default_value_t = 30)]
    reboot_delay: u64,

    /// Seconds between saving Wi-Fi credentials and the restart.
    #[arg(long, env = "PICOFAN_CREDENTIALS_DELAY", default_value_t = 5)]
    credentials_delay: u64,

    /// Seconds to wait before each boot.
    #[arg(long, env = "PICOFAN_BOOT_DELAY", default_value_t = 0)]
    boot_delay: u64,

    #[arg(long, env = "PICOFAN_AP_SSID", default_value = "picoventi")]
    ap_ssid: String,

    #[arg(long, env = "PICOFAN_AP_PASSWORD", default_value = "raspberry")]
    ap_password: String,

    /// Network reported by the simulated scan. Repeat for more.
    #[arg(long = "scan-ssid", value_name = "SSID")]
    scan_ssids: Vec<String>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_ip: self.bind,
            http_port: self.http_port,
            https_port: self.https_port,
            reboot_delay: Duration::from_secs(self.reboot_delay),
            credentials_delay: Duration::from_secs(self.credentials_delay),
            access_point: AccessPointConfig {
                ssid: self.ap_ssid.clone(),
                password: self.ap_password.clone(),
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,picofan_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.server_config();
    let context = DeviceContext::new(&args.root);
    let radio = Arc::new(SimulatedRadio::new(args.scan_ssids.clone()));
    let device = Arc::new(HostDevice::new());

    info!("PicoFan starting with flash root {}", context.root().display());

    loop {
        if args.boot_delay > 0 {
            info!("Booting in {}s", args.boot_delay);
            let delay = Duration::from_secs(args.boot_delay);
            if !wait_for_boot(delay, tokio::signal::ctrl_c()).await {
                info!("Interrupted before boot");
                return Ok(());
            }
        }

        tokio::select! {
            result = boot(&config, &context, radio.clone(), device.clone()) => {
                result?;
                warn!("Server stopped");
                return Ok(());
            }
            _ = device.restarted() => {
                info!("Rebooting");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                return Ok(());
            }
        }
    }
}

/// Sleep out the boot delay. Returns `false` if `interrupt` fires first.
async fn wait_for_boot<F: Future>(delay: Duration, interrupt: F) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = interrupt => false,
    }
}

/// One boot cycle: provisioning without stored credentials, management
/// otherwise.
async fn boot(
    config: &ServerConfig,
    context: &DeviceContext,
    radio: Arc<SimulatedRadio>,
    device: Arc<HostDevice>,
) -> anyhow::Result<()> {
    if context.needs_provisioning() {
        info!("No WiFi credentials stored, starting provisioning");
        let service = ProvisioningService::start(
            radio,
            context,
            &config.access_point,
            config.credentials_delay,
        )?;
        Server::bind(config, context, service, device)
            .await?
            .run()
            .await?;
        return Ok(());
    }

    let credentials = context.credentials.load()?;
    let hostname = match context.config.load() {
        Ok(document) => document.hostname().map(str::to_string),
        Err(e) => {
            warn!("Using default hostname: {}", e);
            None
        }
    };
    let ip = radio.connect_station(&credentials, hostname.as_deref())?;
    info!("Connected to '{}' with IP {}", credentials.ssid, ip);

    let service = ManagementService::new(context.clone(), config.reboot_delay);
    Server::bind(config, context, service, device)
        .await?
        .run()
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_boot_delay_can_be_interrupted() {
        let started = tokio::time::Instant::now();
        assert!(!wait_for_boot(Duration::from_secs(3600), std::future::ready(())).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_boot_delay_elapses() {
        assert!(wait_for_boot(Duration::from_millis(10), std::future::pending::<()>()).await);
    }
}
