//! netdevd - create virtual network devices from declarative definitions.

mod files;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use netdev::rtnl::Rtnl;
use netdev::{MachineId, Manager, RtnlSocket, State};
use tracing::{error, info, warn};

use files::FileSource;

#[derive(Parser)]
#[command(name = "netdevd", version, about = "Declarative network device manager")]
struct Cli {
    /// Directory containing .netdev definition files.
    #[arg(short = 'c', long, default_value = "/etc/netdevd")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the configured devices and wait for them to settle.
    Apply {
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Parse the definitions and print what would be created.
    Show {
        /// Output JSON.
        #[arg(short, long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Apply { timeout } => apply(&cli.config_dir, Duration::from_secs(timeout)),
        Command::Show { json } => show(&cli.config_dir, json),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "netdevd failed");
            ExitCode::FAILURE
        }
    }
}

fn apply(config_dir: &Path, timeout: Duration) -> netdev::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;

    runtime.block_on(async {
        let socket = Rc::new(RtnlSocket::new()?);
        let manager = Rc::new(Manager::new(
            socket.clone() as Rc<dyn Rtnl>,
            Box::new(FileSource::new(config_dir)),
            MachineId::load()?,
        ));
        manager.attach();
        manager.load_all()?;

        if manager.netdevs().is_empty() {
            info!("no applicable definitions");
            return Ok(ExitCode::SUCCESS);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        while !settled(&manager) {
            tokio::select! {
                result = socket.process() => result?,
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("timed out waiting for devices to settle");
                    break;
                }
            }
        }

        let mut failed = false;
        for dev in manager.netdevs() {
            let state = dev.state();
            info!(
                dev = dev.name(),
                kind = %dev.kind(),
                %state,
                ifindex = dev.ifindex().unwrap_or(0),
                "final state"
            );
            if state != State::Ready {
                failed = true;
            }
        }
        Ok(if failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    })
}

/// Every device reached a state it will not leave on its own. Stacked
/// devices stay in `Loading` until some link joins them, which nothing in
/// a plain apply run does, so they count as settled too.
fn settled(manager: &Manager) -> bool {
    manager.netdevs().iter().all(|dev| {
        matches!(
            dev.state(),
            State::Ready | State::Failed | State::Linger | State::Loading
        )
    })
}

#[derive(serde::Serialize)]
struct Summary {
    origin: String,
    matches: bool,
    name: Option<String>,
    kind: Option<String>,
    description: Option<String>,
    mtu: Option<u32>,
    mac: Option<String>,
}

fn show(config_dir: &Path, json: bool) -> netdev::Result<ExitCode> {
    use netdev::definition::DefinitionSource;

    let source = FileSource::new(config_dir);
    let mut summaries = Vec::new();

    for definition in source.definitions()? {
        let probe = definition.probe()?;
        let mut summary = Summary {
            origin: definition.origin().to_string(),
            matches: probe.matches,
            name: probe.name,
            kind: probe.kind.map(|kind| kind.as_str().to_string()),
            description: None,
            mtu: None,
            mac: None,
        };
        if probe.matches {
            if let Some(kind) = probe.kind {
                let settings = definition.load(kind)?;
                summary.description = settings.description;
                summary.mtu = settings.mtu;
                summary.mac = settings.mac.as_ref().map(netdev::mac::format);
            }
        }
        summaries.push(summary);
    }

    if json {
        let text = serde_json::to_string_pretty(&summaries).map_err(std::io::Error::other)?;
        println!("{text}");
    } else {
        for s in &summaries {
            println!(
                "{}: name={} kind={} matches={}",
                s.origin,
                s.name.as_deref().unwrap_or("-"),
                s.kind.as_deref().unwrap_or("-"),
                s.matches,
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
