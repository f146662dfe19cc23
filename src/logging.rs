//! Structured logging for the evaluation client.
//!
//! Every record is one JSON line carrying a per-process sequence number,
//! level, domain and event name. Records go to stderr; when `LOG_DIR` is set
//! they are also appended to `<LOG_DIR>/<run_id>/events.jsonl`.
//!
//! `LOG_LEVEL` and `LOG_DOMAINS` are read once, on the first record.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// What a record is about. Used for filtering with `LOG_DOMAINS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Session,
    Router,
    Settings,
    Schedule,
    Wizard,
    Remote,
    Storage,
    System,
    Profile,
}

impl Domain {
    const ALL: [Domain; 9] = [
        Domain::Session,
        Domain::Router,
        Domain::Settings,
        Domain::Schedule,
        Domain::Wizard,
        Domain::Remote,
        Domain::Storage,
        Domain::System,
        Domain::Profile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Domain::Session => "session",
            Domain::Router => "router",
            Domain::Settings => "settings",
            Domain::Schedule => "schedule",
            Domain::Wizard => "wizard",
            Domain::Remote => "remote",
            Domain::Storage => "storage",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    fn by_name(name: &str) -> Option<Domain> {
        Self::ALL.into_iter().find(|d| d.name() == name.trim())
    }
}

/// Minimum level plus an optional domain allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogFilter {
    min_level: Level,
    domains: Option<Vec<Domain>>,
}

impl LogFilter {
    /// Unknown level names fall back to `info`; unknown domain names are
    /// ignored. `all` (or no list) enables every domain.
    fn parse(level: Option<&str>, domains: Option<&str>) -> Self {
        let min_level = level.and_then(|l| l.parse().ok()).unwrap_or(Level::Info);
        let domains = match domains.map(str::trim) {
            None | Some("all") | Some("") => None,
            Some(list) => Some(list.split(',').filter_map(Domain::by_name).collect()),
        };
        Self { min_level, domains }
    }

    fn allows(&self, level: Level, domain: Domain) -> bool {
        level >= self.min_level && self.domains.as_ref().map_or(true, |d| d.contains(&domain))
    }
}

struct Logger {
    run_id: String,
    filter: LogFilter,
    seq: AtomicU64,
    file: Option<Mutex<BufWriter<File>>>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

fn open_events_file(base: &Path, run_id: &str) -> Option<Mutex<BufWriter<File>>> {
    let dir = base.join(run_id);
    let opened = create_dir_all(&dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("events.jsonl"))
    });
    match opened {
        Ok(file) => Some(Mutex::new(BufWriter::new(file))),
        Err(err) => {
            eprintln!("[log] events file unavailable under {}: {}", dir.display(), err);
            None
        }
    }
}

fn logger() -> &'static Logger {
    LOGGER.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", Utc::now().timestamp_millis(), std::process::id()));
        let filter = LogFilter::parse(
            std::env::var("LOG_LEVEL").ok().as_deref(),
            std::env::var("LOG_DOMAINS").ok().as_deref(),
        );
        let file = std::env::var("LOG_DIR")
            .ok()
            .and_then(|base| open_events_file(Path::new(&base), &run_id));
        Logger {
            run_id,
            filter,
            seq: AtomicU64::new(0),
            file,
        }
    })
}

/// Field names whose values never reach a log line.
const SECRET_FIELDS: [&str; 4] = ["authorization", "Authorization", "token", "password"];

/// Field names lifted out of `data` to the top level of a record.
const TOP_LEVEL_FIELDS: [&str; 4] = ["user", "route", "op", "generation"];

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    run_id: &'a str,
    seq: u64,
    lvl: Level,
    component: Domain,
    event: &'a str,
    msg: Value,
    #[serde(flatten)]
    top: Map<String, Value>,
    data: Map<String, Value>,
}

fn redact(fields: &mut Map<String, Value>) {
    for key in SECRET_FIELDS {
        if let Some(value) = fields.get_mut(key) {
            *value = Value::String("[REDACTED]".to_string());
        }
    }
}

fn render(run_id: &str, seq: u64, level: Level, domain: Domain, event: &str, mut data: Map<String, Value>) -> String {
    redact(&mut data);
    let msg = data.remove("msg").unwrap_or_else(|| Value::String(String::new()));
    let top = TOP_LEVEL_FIELDS
        .iter()
        .filter_map(|key| data.remove(*key).map(|v| (key.to_string(), v)))
        .collect();
    let record = Record {
        ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        run_id,
        seq,
        lvl: level,
        component: domain,
        event,
        msg,
        top,
        data,
    };
    serde_json::to_string(&record).unwrap_or_else(|err| {
        json!({ "lvl": "ERROR", "event": "log_encode_failed", "msg": err.to_string() }).to_string()
    })
}

/// Emits one record if the level and domain pass the filter.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let logger = logger();
    if !logger.filter.allows(level, domain) {
        return;
    }
    let seq = logger.seq.fetch_add(1, Ordering::Relaxed);
    let line = render(&logger.run_id, seq, level, domain, event, fields);
    if let Some(file) = &logger.file {
        if let Ok(mut w) = file.lock() {
            let _ = writeln!(w, "{}", line).and_then(|_| w.flush());
        }
    }
    eprintln!("{}", line);
}

pub fn log_navigation(from: Option<&str>, to: &str, decision: &str) {
    log(
        Level::Info,
        Domain::Router,
        "navigate",
        obj(&[
            ("from", from.map_or(Value::Null, v_str)),
            ("route", v_str(to)),
            ("decision", v_str(decision)),
        ]),
    );
}

pub fn log_remote_failure(op: &str, message: &str) {
    log(
        Level::Warn,
        Domain::Remote,
        "remote_failure",
        obj(&[("op", v_str(op)), ("msg", v_str(message))]),
    );
}

pub fn log_validation(errors: &[String]) {
    let level = if errors.is_empty() { Level::Trace } else { Level::Debug };
    log(
        level,
        Domain::Schedule,
        "validation",
        obj(&[("error_count", json!(errors.len())), ("errors", json!(errors))]),
    );
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

/// Emits a trace record with the elapsed time when dropped.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(self.started.elapsed().as_secs_f64() * 1000.0));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing_and_order() {
        assert_eq!("WARNING".parse::<Level>(), Ok(Level::Warn));
        assert!("loud".parse::<Level>().is_err());
        assert!(Level::Debug < Level::Info && Level::Error < Level::Fatal);
    }

    #[test]
    fn test_filter_defaults_to_info_for_all_domains() {
        let filter = LogFilter::parse(None, None);
        assert!(filter.allows(Level::Info, Domain::Wizard));
        assert!(!filter.allows(Level::Debug, Domain::Wizard));

        let filter = LogFilter::parse(Some("nonsense"), Some("all"));
        assert_eq!(filter.min_level, Level::Info);
        assert_eq!(filter.domains, None);
    }

    #[test]
    fn test_filter_domain_list() {
        let filter = LogFilter::parse(Some("trace"), Some("router, remote,bogus"));
        assert_eq!(filter.domains, Some(vec![Domain::Router, Domain::Remote]));
        assert!(filter.allows(Level::Trace, Domain::Remote));
        assert!(!filter.allows(Level::Error, Domain::Session));
    }

    #[test]
    fn test_record_shape() {
        let line = render(
            "r-test",
            7,
            Level::Warn,
            Domain::Settings,
            "synced",
            obj(&[
                ("user", v_str("alice")),
                ("token", v_str("Basic YWxpY2U6c2VjcmV0")),
                ("msg", v_str("ok")),
                ("recommenders", json!([1, 2])),
            ]),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["lvl"], "WARN");
        assert_eq!(parsed["component"], "settings");
        assert_eq!(parsed["seq"], 7);
        assert_eq!(parsed["user"], "alice");
        assert_eq!(parsed["msg"], "ok");
        assert_eq!(parsed["data"]["token"], "[REDACTED]");
        assert_eq!(parsed["data"]["recommenders"][1], 2);
        assert!(parsed["data"].get("user").is_none());
    }
}
