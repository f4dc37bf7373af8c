use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// Each event consists of a set of key-value-pairs with the measured data
/// or some meta data of the event. This enum specifies all allowed keys and
/// thus the columns of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatParameter {
    /// Time in seconds since daemon start.
    Time,

    /// Description why this entry was made
    LogDescription,

    /// Scheduling round counter
    Round,

    /// Synchronization phase ("pre-change", "sync-change", ...)
    Phase,

    /// Synchronization sub-state being processed
    SyncState,

    /// Application the entry concerns
    AppUid,

    /// Working mode involved
    AwmId,

    /// Time to process the phase in ms
    ProcessingTime,

    /// Sync latency declared by the application in ms
    SyncLatency,

    /// Cumulated sync misses
    SyncMisses,

    /// Execution contexts reconfigured in the round
    ExcsReconfigured,
}

impl StatParameter {
    /// Returns the defined order of columns for the CSV header
    pub fn headers() -> Vec<&'static str> {
        vec!["Time", "LogDescription", "Round", "Phase", "SyncState", "AppUid", "AwmId", "ProcessingTime", "SyncLatency", "SyncMisses", "ExcsReconfigured"]
    }

    fn column(&self) -> usize {
        match self {
            StatParameter::Time => 0,
            StatParameter::LogDescription => 1,
            StatParameter::Round => 2,
            StatParameter::Phase => 3,
            StatParameter::SyncState => 4,
            StatParameter::AppUid => 5,
            StatParameter::AwmId => 6,
            StatParameter::ProcessingTime => 7,
            StatParameter::SyncLatency => 8,
            StatParameter::SyncMisses => 9,
            StatParameter::ExcsReconfigured => 10,
        }
    }
}

/// Store values in their native format, only format them when writing.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for StatValue {
    fn from(v: i64) -> Self {
        StatValue::Integer(v)
    }
}

impl From<u64> for StatValue {
    fn from(v: u64) -> Self {
        StatValue::Integer(v as i64)
    }
}

impl From<u32> for StatValue {
    fn from(v: u32) -> Self {
        StatValue::Integer(v as i64)
    }
}

impl From<f64> for StatValue {
    fn from(v: f64) -> Self {
        StatValue::Float(v)
    }
}

impl From<String> for StatValue {
    fn from(v: String) -> Self {
        StatValue::Text(v)
    }
}

impl From<&str> for StatValue {
    fn from(v: &str) -> Self {
        StatValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatisticEvent {
    data: HashMap<StatParameter, StatValue>,
}

impl StatisticEvent {
    pub fn new() -> Self {
        Self { data: HashMap::new() }
    }

    pub fn set<V: Into<StatValue>>(mut self, param: StatParameter, value: V) -> Self {
        self.data.insert(param, value.into());
        self
    }
}

/// Messages sent from the daemon threads to the writer thread.
enum StatsMessage {
    Log(StatisticEvent),
    Shutdown,
}

/// The handle that allows components to log events. It holds the sender
/// side of the channel; a background thread owns the CSV writer.
pub struct StatsCollector {
    sender: mpsc::Sender<StatsMessage>,
    start_time: u64,
    worker: Option<thread::JoinHandle<()>>,
}

impl StatsCollector {
    /// Spawns the background writer. With no filename, events are dropped
    /// (the collector still accepts them so call sites stay unconditional).
    pub fn init(filename: Option<String>) -> Self {
        let (tx, rx) = mpsc::channel();
        let start_time = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);

        let worker = thread::Builder::new()
            .name("rtrm-stats".to_string())
            .spawn(move || Self::worker_loop(rx, filename))
            .expect("failed to spawn the statistics writer thread");

        StatsCollector { sender: tx, start_time, worker: Some(worker) }
    }

    pub fn log(&self, event: StatisticEvent) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let event = event.set(StatParameter::Time, (now - self.start_time) as i64);
        let _ = self.sender.send(StatsMessage::Log(event));
    }

    pub fn shutdown(&mut self) {
        let _ = self.sender.send(StatsMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn worker_loop(rx: mpsc::Receiver<StatsMessage>, filename: Option<String>) {
        let mut writer = filename.as_ref().and_then(|name| match csv::Writer::from_path(name) {
            Ok(mut w) => {
                if let Err(e) = w.write_record(StatParameter::headers()) {
                    log::error!("Stats: cannot write header to '{}': {}", name, e);
                    return None;
                }
                Some(w)
            }
            Err(e) => {
                log::error!("Stats: cannot open '{}': {}", name, e);
                None
            }
        });

        while let Ok(msg) = rx.recv() {
            match msg {
                StatsMessage::Log(event) => {
                    let Some(w) = writer.as_mut() else {
                        continue;
                    };
                    let mut row = vec![String::new(); StatParameter::headers().len()];
                    for (param, value) in &event.data {
                        let cell = match value {
                            StatValue::Integer(v) => v.to_string(),
                            StatValue::Float(v) => format!("{:.3}", v),
                            StatValue::Text(v) => v.clone(),
                        };
                        row[param.column()] = cell;
                    }
                    if let Err(e) = w.write_record(&row) {
                        log::error!("Stats: write failed: {}", e);
                    }
                }
                StatsMessage::Shutdown => break,
            }
        }
        if let Some(w) = writer.as_mut() {
            let _ = w.flush();
        }
    }
}

impl Drop for StatsCollector {
    fn drop(&mut self) {
        self.shutdown();
    }
}
