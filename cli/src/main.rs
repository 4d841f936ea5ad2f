mod settings;
mod sink;
mod webhook;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::Receiver;
use nfc4pc::config::{ConfigError, RuntimeConfigBuilder};
use nfc4pc::dispatch::{Counters, Dispatcher};
use nfc4pc::idle::IdleTimer;
use nfc4pc::pcsc::{PcscReaders, PcscTerminals};
use nfc4pc::{Lanes, Monitor};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::settings::Settings;
use crate::sink::{notify, DesktopSink};
use crate::webhook::Poster;

/// Seconds to wait for a tap in single-shot mode.
const DEFAULT_TIMEOUT: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("Could not load the configuration: {0}")]
    Settings(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pcsc(#[from] nfc4pc::pcsc::Error),

    #[error("Could not set up the HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not start a thread: {0}")]
    Thread(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Open URLs and call webhooks by presenting NFC tags to PC/SC readers.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Opens the URL with the UID appended for tags carrying no URL
    #[arg(long, value_name = "URL")]
    uid_url: Option<Url>,

    /// Opens the URL with the UID and the URL of the tag appended
    #[arg(long, value_name = "URL")]
    meta_url: Option<Url>,

    /// Posts the UID and the URL of the tag to the endpoint
    #[arg(long, value_name = "URL")]
    webhook: Option<Url>,

    /// Value of the Authorization header sent to the webhook
    #[arg(long, value_name = "VALUE")]
    authorization: Option<String>,

    /// Reads the settings from the TOML file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keeps running after the first tap
    #[arg(short = 'c', long = "continue")]
    continuous: bool,

    /// Seconds to wait for the first tap, 0 to wait forever [default: 30]
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Prints debug logs including APDUs
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn actions(&self) -> RuntimeConfigBuilder {
        RuntimeConfigBuilder {
            uid_url: self.uid_url.clone(),
            meta_url: self.meta_url.clone(),
            webhook: self.webhook.clone(),
            authorization: self.authorization.clone(),
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match debug {
            true => "info,nfc4pc=debug,nfc4pc_cli=debug",
            false => "info",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.debug);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    if let Some(path) = &args.config {
        if !path.is_file() {
            return Err(Error::MissingConfig(path.clone()));
        }
    }

    let settings = Settings::load(args.config.as_deref()).map_err(Box::new)?;
    let timeout = args.timeout.or(settings.timeout).unwrap_or(DEFAULT_TIMEOUT);
    let config = settings.actions.merge(args.actions()).build()?;

    let (poster, posting) = match config.webhook() {
        Some(_) => {
            let (poster, thread) = Poster::spawn()?;
            (Some(poster), Some(thread))
        }
        None => (None, None),
    };

    let (dispatched, dispatches) = crossbeam_channel::bounded(1);
    let (aborted, aborts) = crossbeam_channel::bounded(1);
    let sink = match args.continuous {
        true => DesktopSink::new(poster),
        false => DesktopSink::new(poster).signalling(dispatched),
    };

    let counters = Arc::new(Counters::new());
    let dispatcher = Arc::new(Dispatcher::with_counters(config, sink, Arc::clone(&counters)));
    let lanes = Lanes::new(PcscTerminals::try_new()?);

    let timer = match (args.continuous, timeout) {
        (false, 1..) => Some(IdleTimer::start(Duration::from_secs(timeout), move || {
            notify("Timed out", &format!("No tag was presented within {} seconds", timeout));
        })?),
        _ => None,
    };
    let canceller = timer.as_ref().map(IdleTimer::canceller);

    let monitor = Monitor::new().spawn(
        PcscReaders::try_new()?,
        move |reader| {
            if let Some(canceller) = &canceller {
                canceller.cancel();
            }

            if let Err(e) = lanes.schedule_tap(reader, Arc::clone(&dispatcher)) {
                error!("Could not schedule a read on {}: {}", reader, e);
                let _ = aborted.try_send(());
            }
        },
        |_| {},
    )?;

    info!("Waiting for tags");

    let code = match args.continuous {
        true => ExitCode::SUCCESS,
        false => {
            let code = wait_for_tap(&dispatches, &aborts, timer);
            monitor.stop();

            code
        }
    };

    // the lanes, and with them the sink, go away with the monitor
    if monitor.join().is_err() {
        error!("Monitor panicked");
    }
    if let Some(posting) = posting {
        if posting.join().is_err() {
            error!("Webhook poster panicked");
        }
    }

    println!("{}", counters.snapshot());

    Ok(code)
}

/// Waits for the first tap to be dispatched.
/// Fails if the timer expires before any tap, or if the tap could not be read at all.
fn wait_for_tap(dispatches: &Receiver<()>, aborts: &Receiver<()>, timer: Option<IdleTimer>) -> ExitCode {
    if let Some(timer) = timer {
        if timer.wait() {
            return ExitCode::FAILURE;
        }
    }

    crossbeam_channel::select! {
        recv(dispatches) -> dispatched => match dispatched {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => {
                error!("Dispatcher went away before any tap");
                ExitCode::FAILURE
            }
        },
        recv(aborts) -> _ => ExitCode::FAILURE,
    }
}
