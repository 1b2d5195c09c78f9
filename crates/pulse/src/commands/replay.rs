//! Event log replay.
//!
//! Each line of the input is either an event object (it has an
//! `event_type`) or a control record:
//!
//! ```text
//! {"activity": "active", "time": 1000}
//! {"set_session_id": 5000, "time": 1010}
//! {"opt_out": true}
//! ```
//!
//! A manual clock follows the `time` of each record, so a log replays with
//! the same session boundaries however fast it is read.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use colored::Colorize;
use pulse_core::{ActivityState, Event};
use pulse_sdk::plugins::DeliveryCollaborator;
use pulse_sdk::timeline::Completion;
use pulse_sdk::utils::{ManualClock, now_millis};
use pulse_sdk::Client;
use serde_json::Value;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::cli::ReplayArgs;
use crate::config::Config;
use crate::store::JsonFileStore;

/// One line of a replay log.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Event(Event),
    Activity {
        state: ActivityState,
        time: Option<i64>,
    },
    SetSessionId {
        session_id: i64,
        time: Option<i64>,
    },
    OptOut(bool),
}

impl Record {
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line).context("Invalid JSON")?;
        let Some(object) = value.as_object() else {
            bail!("Record must be a JSON object");
        };

        if object.contains_key("event_type") {
            let event = serde_json::from_value(value).context("Invalid event")?;
            return Ok(Record::Event(event));
        }

        let time = match object.get("time") {
            Some(time) => Some(time.as_i64().context("time must be an integer")?),
            None => None,
        };

        if let Some(activity) = object.get("activity") {
            let state = serde_json::from_value(activity.clone())
                .context("activity must be \"active\" or \"background\"")?;
            return Ok(Record::Activity { state, time });
        }
        if let Some(session_id) = object.get("set_session_id") {
            let session_id = session_id
                .as_i64()
                .context("set_session_id must be an integer")?;
            return Ok(Record::SetSessionId { session_id, time });
        }
        if let Some(opt_out) = object.get("opt_out") {
            let opt_out = opt_out.as_bool().context("opt_out must be a boolean")?;
            return Ok(Record::OptOut(opt_out));
        }

        bail!("Unrecognized record")
    }

    /// Time the clock moves to before the record is applied.
    pub fn time(&self) -> Option<i64> {
        match self {
            Record::Event(event) => event.time,
            Record::Activity { time, .. } | Record::SetSessionId { time, .. } => *time,
            Record::OptOut(_) => None,
        }
    }
}

/// Parse every non-blank line of a replay log.
pub fn parse_records(content: &str) -> Result<Vec<Record>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            Record::parse(line).with_context(|| format!("line {}", index + 1))
        })
        .collect()
}

/// Counts reported at the end of a replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub controls: usize,
}

/// Apply records in order, moving `clock` along with them.
pub async fn replay(client: &Client, clock: &ManualClock, records: Vec<Record>) -> ReplaySummary {
    let mut summary = ReplaySummary::default();

    for record in records {
        if let Some(time) = record.time() {
            clock.set(time);
        }

        match record {
            Record::Event(event) => {
                summary.events += 1;
                let result = client.track(event).await.result().await;
                if result.is_success() {
                    summary.delivered += 1;
                } else {
                    summary.skipped += 1;
                    debug!("{} skipped: {}", result.event.event_type, result.message);
                }
            }
            Record::Activity { state, .. } => {
                summary.controls += 1;
                client.set_activity(state).await;
            }
            Record::SetSessionId { session_id, .. } => {
                summary.controls += 1;
                client.set_session_id(session_id).await;
            }
            Record::OptOut(opt_out) => {
                summary.controls += 1;
                client.set_opt_out(opt_out).await;
            }
        }
    }

    summary
}

/// Collaborator writing each event as one JSON line.
pub struct JsonLinesDestination {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesDestination {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write_line(&self, event: &Event) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *out, event)?;
        writeln!(out)?;
        Ok(())
    }

    fn flush_output(&self) -> std::io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.flush()
    }
}

#[async_trait]
impl DeliveryCollaborator for JsonLinesDestination {
    async fn deliver(&self, event: Event, completion: Completion) {
        match self.write_line(&event) {
            Ok(()) => completion.complete(event, 200, "Event written"),
            Err(e) => completion.complete(event, 500, format!("Failed to write event: {}", e)),
        }
    }

    async fn flush(&self) {
        if let Err(e) = self.flush_output() {
            warn!("Failed to flush event output: {}", e);
        }
    }
}

pub async fn execute(args: ReplayArgs, config: &Config) -> Result<()> {
    let mut config = config.clone().with_args(&args.client);
    if let Some(timeout_ms) = args.timeout_ms {
        config.session_timeout_ms = timeout_ms;
    }
    if args.track_sessions {
        config.tracking_session_events = true;
    }
    let pulse_config = config.pulse_config()?;

    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let records = parse_records(&content)?;

    let start = records
        .iter()
        .find_map(Record::time)
        .unwrap_or_else(now_millis);
    let clock = Arc::new(ManualClock::new(start));

    let client = Client::builder(pulse_config)
        .store(Arc::new(JsonFileStore::new(&config.state_dir)))
        .clock(clock.clone())
        .destination(Arc::new(JsonLinesDestination::stdout()))
        .build()?;
    client.init().await?;

    info!("Replaying {} records from {}", records.len(), args.file.display());
    let summary = replay(&client, &clock, records).await;
    client.shutdown().await;

    eprintln!(
        "{} {} events ({} delivered, {} skipped), {} control records",
        "Replayed".green().bold(),
        summary.events,
        summary.delivered,
        summary.skipped,
        summary.controls
    );
    if let Some(session_id) = client.session_id() {
        eprintln!("{} {}", "Session:".cyan(), session_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_sdk::plugins::MemoryDestination;
    use pulse_sdk::{PulseConfig, SESSION_END, SESSION_START};
    use tempfile::tempdir;

    const LOG: &str = r#"
{"event_type": "opened", "time": 950}
{"event_type": "viewed", "time": 1000}

{"event_type": "clicked", "time": 1200}
{"set_session_id": 5000, "time": 1210}
{"event_type": "late", "time": 4000}
{"opt_out": true}
{"event_type": "hidden", "time": 4010}
"#;

    #[test]
    fn test_parse_records() {
        let records = parse_records(LOG).unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[0].time(), Some(950));
        assert_eq!(
            records[3],
            Record::SetSessionId {
                session_id: 5000,
                time: Some(1210)
            }
        );
        assert_eq!(records[5], Record::OptOut(true));

        let activity = Record::parse(r#"{"activity": "background", "time": 7}"#).unwrap();
        assert_eq!(
            activity,
            Record::Activity {
                state: ActivityState::Background,
                time: Some(7)
            }
        );
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = parse_records("{\"event_type\": \"a\"}\n{\"bogus\": 1}").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));

        assert!(Record::parse("[1, 2]").is_err());
        assert!(Record::parse(r#"{"activity": "asleep"}"#).is_err());
    }

    #[tokio::test]
    async fn test_replay_annotates_events() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(950));
        let destination = Arc::new(MemoryDestination::new());
        let config = PulseConfig::new("test-api-key")
            .with_session_timeout_ms(100)
            .with_session_events(true);

        let client = Client::builder(config)
            .store(Arc::new(JsonFileStore::new(dir.path())))
            .clock(clock.clone())
            .destination(destination.clone())
            .build()
            .unwrap();
        client.init().await.unwrap();

        let summary = replay(&client, &clock, parse_records(LOG).unwrap()).await;
        client.shutdown().await;

        assert_eq!(
            summary,
            ReplaySummary {
                events: 5,
                delivered: 4,
                skipped: 1,
                controls: 2,
            }
        );

        let delivered: Vec<(String, Option<i64>)> = destination
            .events()
            .await
            .into_iter()
            .map(|e| (e.event_type, e.session_id))
            .collect();
        let expected: Vec<(String, Option<i64>)> = [
            (SESSION_START, 950),
            ("opened", 950),
            ("viewed", 950),
            (SESSION_END, 950),
            (SESSION_START, 1200),
            ("clicked", 1200),
            (SESSION_END, 1200),
            (SESSION_START, 5000),
            ("late", 5000),
        ]
        .into_iter()
        .map(|(t, s)| (t.to_string(), Some(s)))
        .collect();
        assert_eq!(delivered, expected);

        let stored = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_json_lines_destination_writes_lines() {
        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);

        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(buf)
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buffer = Shared::default();
        let destination = JsonLinesDestination::new(Box::new(buffer.clone()));

        let (completion, rx) = Completion::channel();
        destination
            .deliver(Event::new("a").with_session_id(1), completion)
            .await;
        assert_eq!(rx.await.unwrap().code, 200);

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "{\"event_type\":\"a\",\"session_id\":1}\n");
    }

    #[tokio::test]
    async fn test_json_lines_destination_flush_failure() {
        struct Closed;

        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
        }

        let destination = JsonLinesDestination::new(Box::new(Closed));
        let err = destination.flush_output().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

        // Reported through the log, not a panic.
        destination.flush().await;

        let (completion, rx) = Completion::channel();
        destination.deliver(Event::new("a"), completion).await;
        let result = rx.await.unwrap();
        assert_eq!(result.code, 500);
        assert!(result.message.contains("Failed to write event"));
    }
}
