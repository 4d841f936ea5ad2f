use std::process::{Command, Stdio};
use std::thread;

use crossbeam_channel::Sender;
use nfc4pc::dispatch::{Action, SinkError};
use nfc4pc::ActionSink;
use tracing::{info, warn};

use crate::webhook::{Poster, Request};

/// Shows a message to the user.
pub fn notify(title: &str, message: &str) {
    warn!("{}: {}", title, message);
    eprintln!("{}: {}", title, message);
}

/// Performs actions on the desktop: URLs go to the default browser, webhooks to the poster.
pub struct DesktopSink {
    poster: Option<Poster>,
    dispatched: Option<Sender<()>>,
}

impl DesktopSink {
    pub fn new(poster: Option<Poster>) -> Self {
        Self {
            poster,
            dispatched: None,
        }
    }

    /// Signals the channel after every action, performed or not.
    pub fn signalling(mut self, dispatched: Sender<()>) -> Self {
        self.dispatched = Some(dispatched);
        self
    }

    fn post(&self, request: Request) -> Result<(), SinkError> {
        match &self.poster {
            Some(poster) => Ok(poster.enqueue(request)?),
            None => Err("webhook poster is not running".into()),
        }
    }
}

impl ActionSink for DesktopSink {
    fn perform(&self, action: Action) -> Result<(), SinkError> {
        let result = match action {
            Action::OpenUrl(url) => open_browser(&url),
            Action::PostWebhook {
                url,
                fields,
                authorization,
            } => self.post(Request {
                url,
                fields,
                authorization,
            }),
            Action::Notify { title, message } => {
                notify(&title, &message);
                Ok(())
            }
            Action::NoAction(reason) => {
                info!("{}", reason);
                Ok(())
            }
        };

        if let Some(dispatched) = &self.dispatched {
            let _ = dispatched.try_send(());
        }

        result
    }
}

fn open_browser(url: &str) -> Result<(), SinkError> {
    info!("Opening {}", url);

    let mut command = if cfg!(target_os = "windows") {
        let mut command = Command::new("rundll32");
        command.arg("url.dll,FileProtocolHandler");
        command
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };

    let mut child = command
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    // reap the launcher without holding the lane
    thread::spawn(move || {
        if let Ok(status) = child.wait() {
            if !status.success() {
                warn!("Browser launcher exited with {}", status);
            }
        }
    });

    Ok(())
}
