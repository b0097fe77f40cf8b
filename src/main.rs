use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use softap_provisioner::{
    ProvisionerConfig, ProvisioningSession,
    certificate::CertificatePinning,
    http_client::HttpsExchange,
    observer::default_observer,
    services::{association::NmcliHost, discovery::MdnsBrowser},
    types::ProvisioningRequest,
};
use std::io::Write;

type Session = ProvisioningSession<MdnsBrowser, NmcliHost, HttpsExchange>;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the networks the device can see
    Scan,
    /// Provision the device with a network it can see
    Provision {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        passphrase: Option<String>,
        /// Keep the credentials in volatile memory only
        #[arg(long)]
        volatile: bool,
    },
    /// Read or switch one of the device's LEDs
    Led {
        #[command(subcommand)]
        command: LedCommand,
    },
}

#[derive(Subcommand)]
enum LedCommand {
    Get { led: u8 },
    Set { led: u8, state: LedState },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LedState {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        error!("{e:#}");
        std::process::exit(1);
    }

    debug!("good bye");
}

async fn run(command: Command) -> Result<()> {
    let config = ProvisionerConfig::from_env()?;
    let mut session = session(&config)?;

    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("ctrl-c");
            cancel.cancel();
        }
    });

    session.connect().await?;

    match command {
        Command::Scan => {
            let candidates = session.scan().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&candidates).context("failed to serialize networks")?
            );
        }
        Command::Provision {
            ssid,
            passphrase,
            volatile,
        } => {
            let Some(target) = session
                .scan()
                .await?
                .into_iter()
                .find(|candidate| candidate.ssid == ssid)
            else {
                bail!("device does not see network {ssid}");
            };

            if target.authentication_mode.requires_passphrase() && passphrase.is_none() {
                bail!("network {ssid} requires a passphrase");
            }

            let mut request = ProvisioningRequest::new(target, passphrase);
            request.volatile_memory = volatile;

            session.submit(request).await?;
            session.associate_with_target().await?;
            let address = session.locate_on_target().await?;
            session.complete()?;
            info!("device provisioned with {ssid}, reachable at {address}");
        }
        Command::Led { command } => match command {
            LedCommand::Get { led } => {
                let enabled = session.led_status(led).await?;
                println!("{}", if enabled { "on" } else { "off" });
            }
            LedCommand::Set { led, state } => {
                session
                    .set_led(led, matches!(state, LedState::On))
                    .await?;
            }
        },
    }

    Ok(())
}

fn session(config: &ProvisionerConfig) -> Result<Session> {
    let pinning = CertificatePinning::from_pem_file(&config.exchange.cert_path)?;
    let exchange = HttpsExchange::new(pinning, config.exchange.request_timeout)?;
    let browser = MdnsBrowser::new().context("failed to start mdns daemon")?;

    Ok(ProvisioningSession::new(
        browser,
        NmcliHost::default(),
        exchange,
        config,
        default_observer(),
    ))
}
