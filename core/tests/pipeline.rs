use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use nfc4pc::dispatch::{Action, Dispatcher, SinkError};
use nfc4pc::monitor::{MonitorError, ReaderSource, ReaderStatus};
use nfc4pc::nfc::{self, Command, Handler, Response};
use nfc4pc::terminal::{Connection, Terminal, TerminalFactory};
use nfc4pc::{Lanes, Monitor, RuntimeConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

// --- Fake readers ---

/// Called with the reader name whenever a tag answers GET UID.
type OnRead = dyn Fn(&str) + Send + Sync;

#[derive(Default)]
struct Log {
    events: Mutex<Vec<(String, &'static str)>>,
    active: Mutex<HashMap<String, usize>>,
    max_active: AtomicUsize,
}

impl Log {
    fn push(&self, reader: &str, event: &'static str) {
        self.events.lock().push((reader.to_string(), event));
    }

    fn events_of(&self, reader: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter(|(r, _)| r == reader)
            .map(|(_, e)| *e)
            .collect()
    }
}

struct FakeTerminals {
    log: Arc<Log>,
    on_read: Arc<OnRead>,
}

struct FakeTerminal {
    reader: String,
    log: Arc<Log>,
    on_read: Arc<OnRead>,
}

struct FakeConnection {
    reader: String,
    log: Arc<Log>,
    on_read: Arc<OnRead>,
}

impl TerminalFactory for FakeTerminals {
    type Terminal = FakeTerminal;

    fn open(&self, reader: &str) -> Result<Self::Terminal, nfc::Error> {
        self.log.push(reader, "open");

        Ok(FakeTerminal {
            reader: reader.to_string(),
            log: Arc::clone(&self.log),
            on_read: Arc::clone(&self.on_read),
        })
    }
}

impl Terminal for FakeTerminal {
    type Connection = FakeConnection;

    fn connect(&mut self) -> Result<Self::Connection, nfc::Error> {
        self.log.push(&self.reader, "connect");

        Ok(FakeConnection {
            reader: self.reader.clone(),
            log: Arc::clone(&self.log),
            on_read: Arc::clone(&self.on_read),
        })
    }
}

impl Handler for FakeConnection {
    fn handle(&self, command: Command) -> Result<Response, nfc::Error> {
        match Vec::from(command).as_slice() {
            [0xFF, 0xCA, ..] => {
                (self.on_read)(&self.reader);

                Ok(Response::from(vec![0x04, 0x11, 0x22, 0x33, 0x90, 0x00]))
            }
            _ => Ok(Response::from(vec![0x6A, 0x82])),
        }
    }
}

impl Connection for FakeConnection {
    fn exclusive<R, F>(&mut self, f: F) -> Result<R, nfc::Error>
    where
        F: FnOnce(&dyn Handler) -> R,
    {
        let active = {
            let mut active = self.log.active.lock();
            let count = active.entry(self.reader.clone()).or_default();
            *count += 1;
            *count
        };
        self.log.max_active.fetch_max(active, Ordering::SeqCst);
        self.log.push(&self.reader, "begin");

        let result = f(&*self);

        self.log.push(&self.reader, "end");
        if let Some(count) = self.log.active.lock().get_mut(&self.reader) {
            *count -= 1;
        }

        Ok(result)
    }

    fn disconnect(self) -> Result<(), nfc::Error> {
        self.log.push(&self.reader, "disconnect");

        Ok(())
    }
}

type Poll = Result<Vec<ReaderStatus>, &'static str>;

/// A reader source fed by the test, repeating the last poll when nothing new arrives.
struct FakeSource {
    polls: Receiver<Poll>,
    polled: Sender<()>,
    last: Vec<ReaderStatus>,
}

impl ReaderSource for FakeSource {
    fn poll(&mut self) -> Result<Vec<ReaderStatus>, MonitorError> {
        if let Ok(poll) = self.polls.recv_timeout(Duration::from_millis(20)) {
            let _ = self.polled.send(());
            self.last = poll.map_err(|e| MonitorError::enumeration(std::io::Error::other(e)))?;
        }

        Ok(self.last.clone())
    }
}

// --- Helpers ---

fn pipeline<F>(on_read: F) -> (Lanes<FakeTerminals>, Arc<Log>, Arc<Dispatcher<impl nfc4pc::ActionSink>>, Receiver<Action>)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let log = Arc::new(Log::default());
    let lanes = Lanes::new(FakeTerminals {
        log: Arc::clone(&log),
        on_read: Arc::new(on_read),
    });

    let (actions, performed) = crossbeam_channel::unbounded();
    let sink = move |action: Action| -> Result<(), SinkError> {
        actions.send(action)?;

        Ok(())
    };
    let config = RuntimeConfig::builder()
        .uid_url("https://example.com/tag".parse().unwrap())
        .build()
        .unwrap();

    (lanes, log, Arc::new(Dispatcher::new(config, sink)), performed)
}

fn source() -> (FakeSource, Sender<Poll>, Receiver<()>) {
    let (polls, source_polls) = crossbeam_channel::unbounded();
    let (polled, source_polled) = crossbeam_channel::unbounded();
    let source = FakeSource {
        polls: source_polls,
        polled,
        last: Vec::new(),
    };

    (source, polls, source_polled)
}

fn present(name: &str) -> ReaderStatus {
    ReaderStatus::new(name, true)
}

fn absent(name: &str) -> ReaderStatus {
    ReaderStatus::new(name, false)
}

// --- Tests ---

#[test]
fn test_same_reader_is_sequential() {
    let (lanes, log, dispatcher, performed) = pipeline(|_| std::thread::sleep(Duration::from_millis(30)));

    for _ in 0..3 {
        lanes.schedule_tap("ACS ACR1252", Arc::clone(&dispatcher)).unwrap();
    }

    for _ in 0..3 {
        assert_eq!(
            Action::OpenUrl("https://example.com/tag?uid=04112233".to_string()),
            performed.recv_timeout(TIMEOUT).unwrap(),
        );
    }

    assert_eq!(1, log.max_active.load(Ordering::SeqCst));
    assert_eq!(
        vec![
            "open", "connect", "begin", "end", "disconnect", "connect", "begin", "end",
            "disconnect", "connect", "begin", "end", "disconnect",
        ],
        log.events_of("ACS ACR1252"),
    );
    assert_eq!(3, dispatcher.counters().snapshot().uid);
}

#[test]
fn test_readers_are_parallel() {
    // each read only finishes once the other reader has started reading
    let (arrived, arrivals) = crossbeam_channel::unbounded::<String>();
    let arrivals = Arc::new(Mutex::new(arrivals));
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));

    let (lanes, _, dispatcher, performed) = pipeline(move |reader| {
        arrived.send(reader.to_string()).unwrap();

        let deadline = std::time::Instant::now() + TIMEOUT;
        while std::time::Instant::now() < deadline {
            if let Ok(other) = arrivals.lock().recv_timeout(Duration::from_millis(10)) {
                seen.lock().push(other);
            }
            if seen.lock().iter().any(|r| r != reader) {
                return;
            }
        }

        panic!("{} waited alone", reader);
    });

    lanes.schedule_tap("R1", Arc::clone(&dispatcher)).unwrap();
    lanes.schedule_tap("R2", Arc::clone(&dispatcher)).unwrap();

    for _ in 0..2 {
        assert!(matches!(
            performed.recv_timeout(TIMEOUT).unwrap(),
            Action::OpenUrl(_)
        ));
    }
    assert_eq!(vec!["R1".to_string(), "R2".to_string()], lanes.readers());
}

#[test]
fn test_monitor_cold_start() {
    let (lanes, log, dispatcher, performed) = pipeline(|_| {});
    let (source, polls, source_polled) = source();

    let monitor = Monitor::new()
        .spawn(
            source,
            move |reader| lanes.schedule_tap(reader, Arc::clone(&dispatcher)).unwrap(),
            |_| {},
        )
        .unwrap();

    let step = |readers: Vec<ReaderStatus>| {
        polls.send(Ok(readers)).unwrap();
        source_polled.recv_timeout(TIMEOUT).unwrap();
    };

    // a tag lying on the reader at startup is left alone
    step(vec![present("R1"), absent("R2")]);
    step(vec![present("R1"), absent("R2")]);
    assert!(performed.recv_timeout(Duration::from_millis(100)).is_err());

    // a fresh tap on the other reader
    step(vec![present("R1"), present("R2")]);
    assert!(matches!(
        performed.recv_timeout(TIMEOUT).unwrap(),
        Action::OpenUrl(_)
    ));

    // removing and presenting again
    step(vec![absent("R1"), present("R2")]);
    step(vec![present("R1"), present("R2")]);
    assert!(matches!(
        performed.recv_timeout(TIMEOUT).unwrap(),
        Action::OpenUrl(_)
    ));
    assert!(performed.recv_timeout(Duration::from_millis(100)).is_err());

    monitor.stop();
    monitor.join().unwrap();

    assert_eq!(vec!["open", "connect", "begin", "end", "disconnect"], log.events_of("R1"));
    assert_eq!(vec!["open", "connect", "begin", "end", "disconnect"], log.events_of("R2"));
}

#[test]
fn test_monitor_survives_source_error() {
    let (lanes, _, dispatcher, performed) = pipeline(|_| {});
    let (source, polls, source_polled) = source();
    let (failed, failures) = crossbeam_channel::unbounded();

    let monitor = Monitor::new()
        .spawn(
            source,
            move |reader| lanes.schedule_tap(reader, Arc::clone(&dispatcher)).unwrap(),
            move |e| failed.send(e.to_string()).unwrap(),
        )
        .unwrap();

    polls.send(Ok(vec![absent("R1")])).unwrap();
    source_polled.recv_timeout(TIMEOUT).unwrap();

    // the PC/SC service went away for a moment
    polls.send(Err("service stopped")).unwrap();
    assert_eq!(
        "Could not list readers: service stopped",
        failures.recv_timeout(TIMEOUT).unwrap(),
    );

    polls.send(Ok(vec![present("R1")])).unwrap();
    assert!(matches!(
        performed.recv_timeout(TIMEOUT).unwrap(),
        Action::OpenUrl(_)
    ));
    assert_eq!(0, failures.try_iter().count());

    monitor.stop();
    monitor.join().unwrap();
}
