//! Turning a tap into exactly one action.
//!
//! The policy, in order of priority:
//!
//! 1. a webhook receives the UID, and the URL if any;
//! 2. the meta URL is opened with the UID, and the URL if any;
//! 3. the UID URL is opened with the UID, for tags carrying no URL;
//! 4. nothing happens if there is no URL either, which is reported;
//! 5. the URL of the tag is opened as is.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use url::Url;

use crate::config::RuntimeConfig;
use crate::tap::{TapError, TapResult};

#[cfg(feature = "tracing")]
use tracing::{error, info};

/// What to do about a tap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    OpenUrl(String),

    /// Posts the form fields `uid` and `url` to the endpoint.
    PostWebhook {
        url: Url,
        fields: BTreeMap<String, String>,
        authorization: Option<String>,
    },

    /// Tells the user something went wrong.
    Notify { title: String, message: String },

    NoAction(String),
}

/// Which usage counter an action is accounted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Url,
    Uid,
    Meta,
    Webhook,
}

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Performs actions on behalf of the dispatcher, e.g. by launching a browser.
/// Called on the lane of the reader, so it must not block for long.
pub trait ActionSink: Send + Sync + 'static {
    fn perform(&self, action: Action) -> Result<(), SinkError>;
}

impl<F> ActionSink for F
where
    F: Fn(Action) -> Result<(), SinkError> + Send + Sync + 'static,
{
    fn perform(&self, action: Action) -> Result<(), SinkError> {
        self(action)
    }
}

/// Usage counters, shared by every lane.
#[derive(Debug, Default)]
pub struct Counters {
    taps: AtomicU64,
    url: AtomicU64,
    uid: AtomicU64,
    meta: AtomicU64,
    webhook: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tap(&self) {
        self.taps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, kind: ActionKind) {
        let counter = match kind {
            ActionKind::Url => &self.url,
            ActionKind::Uid => &self.uid,
            ActionKind::Meta => &self.meta,
            ActionKind::Webhook => &self.webhook,
        };

        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Usage {
        Usage {
            taps: self.taps.load(Ordering::Relaxed),
            url: self.url.load(Ordering::Relaxed),
            uid: self.uid.load(Ordering::Relaxed),
            meta: self.meta.load(Ordering::Relaxed),
            webhook: self.webhook.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Usage {
    pub taps: u64,
    pub url: u64,
    pub uid: u64,
    pub meta: u64,
    pub webhook: u64,
}

impl Usage {
    pub fn actions(&self) -> u64 {
        self.url + self.uid + self.meta + self.webhook
    }
}

impl Display for Usage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} actions for {} taps", self.actions(), self.taps)
    }
}

/// Decides the action for the tap, and the counter it is accounted to.
pub fn decide(config: &RuntimeConfig, tap: &TapResult) -> (Action, Option<ActionKind>) {
    let uid = match tap.uid() {
        Some(uid) => uid.to_hex(),
        None => {
            return match tap.error() {
                Some(e @ TapError::Connection(_)) => (
                    Action::Notify {
                        title: "Could not read".to_string(),
                        message: format!("{}: {}", tap.reader(), e),
                    },
                    None,
                ),
                Some(e) => (Action::NoAction(e.to_string()), None),
                None => (Action::NoAction("No UID".to_string()), None),
            };
        }
    };

    if let Some(webhook) = config.webhook() {
        let mut fields = BTreeMap::from([("uid".to_string(), uid)]);
        if let Some(url) = tap.url() {
            fields.insert("url".to_string(), url.to_string());
        }

        return (
            Action::PostWebhook {
                url: webhook.clone(),
                fields,
                authorization: config.authorization().map(str::to_string),
            },
            Some(ActionKind::Webhook),
        );
    }

    if let Some(meta_url) = config.meta_url() {
        let mut target = meta_url.clone();
        {
            let mut query = target.query_pairs_mut();
            query.append_pair("uid", &uid);
            if let Some(url) = tap.url() {
                query.append_pair("url", url);
            }
        }

        return (Action::OpenUrl(target.into()), Some(ActionKind::Meta));
    }

    match (tap.url(), config.uid_url()) {
        (Some(url), _) => (Action::OpenUrl(url.to_string()), Some(ActionKind::Url)),
        (None, Some(uid_url)) => {
            let mut target = uid_url.clone();
            target.query_pairs_mut().append_pair("uid", &uid);

            (Action::OpenUrl(target.into()), Some(ActionKind::Uid))
        }
        (None, None) => (
            Action::NoAction(match tap.error() {
                Some(e) => format!("{} on {}", e, uid),
                None => format!("No action detected for {}", uid),
            }),
            None,
        ),
    }
}

/// Applies the policy to every tap and hands the action to the sink.
pub struct Dispatcher<S>
where
    S: ActionSink,
{
    config: RuntimeConfig,
    sink: S,
    counters: Arc<Counters>,
}

impl<S> Dispatcher<S>
where
    S: ActionSink,
{
    pub fn new(config: RuntimeConfig, sink: S) -> Self {
        Self::with_counters(config, sink, Arc::new(Counters::new()))
    }

    pub fn with_counters(config: RuntimeConfig, sink: S, counters: Arc<Counters>) -> Self {
        Self {
            config,
            sink,
            counters,
        }
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Performs the action for the tap.
    /// The matching counter is incremented only if the sink accepted the action.
    pub fn dispatch(&self, tap: TapResult) {
        self.counters.record_tap();

        let (action, kind) = decide(&self.config, &tap);
        info!("{} -> {:?}", tap, action);

        match self.sink.perform(action) {
            Ok(()) => {
                if let Some(kind) = kind {
                    self.counters.record(kind);
                }
            }
            Err(e) => error!("Could not perform the action for {}: {}", tap.reader(), e),
        }
    }
}
