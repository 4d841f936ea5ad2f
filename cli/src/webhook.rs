//! Posting taps to the webhook on a background thread.

use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{SendError, Sender};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use crate::sink::notify;

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("Could not reach the webhook: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook {0} answered {1}")]
    Status(Url, StatusCode),
}

/// A form to be posted to the webhook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub url: Url,
    pub fields: BTreeMap<String, String>,
    pub authorization: Option<String>,
}

/// Queues requests for the poster thread.
#[derive(Clone)]
pub struct Poster {
    requests: Sender<Request>,
}

impl Poster {
    /// Starts the poster thread.
    /// The thread exits once every [`Poster`] is dropped and the queue is drained.
    pub fn spawn() -> crate::Result<(Self, JoinHandle<()>)> {
        let client = Client::builder().timeout(TIMEOUT).build()?;
        let (requests, queue) = crossbeam_channel::unbounded::<Request>();

        let thread = thread::Builder::new()
            .name("webhook".to_string())
            .spawn(move || {
                for request in queue {
                    if let Err(e) = post(&client, &request) {
                        notify("Webhook failed", &e.to_string());
                    }
                }

                debug!("Webhook poster stopped");
            })?;

        Ok((Self { requests }, thread))
    }

    pub fn enqueue(&self, request: Request) -> Result<(), SendError<Request>> {
        self.requests.send(request)
    }

    #[cfg(test)]
    pub fn detached() -> (Self, crossbeam_channel::Receiver<Request>) {
        let (requests, queue) = crossbeam_channel::unbounded();

        (Self { requests }, queue)
    }
}

fn post(client: &Client, request: &Request) -> Result<(), PostError> {
    let mut builder = client.post(request.url.clone()).form(&request.fields);
    if let Some(authorization) = &request.authorization {
        builder = builder.header(AUTHORIZATION, authorization);
    }

    let status = builder.send()?.status();
    if status != StatusCode::OK {
        return Err(PostError::Status(request.url.clone(), status));
    }

    info!("Posted to {}", request.url);

    Ok(())
}
