use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

const DESK_DIR: &str = "sentiment-desk";

/// `$TRADES_DIR/sentiment-desk`, else `TRADES/sentiment-desk` under the
/// enclosing git checkout, else relative to the working directory.
pub fn resolve_trades_dir() -> PathBuf {
    let base = std::env::var("TRADES_DIR")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            let cwd = std::env::current_dir().ok()?;
            cwd.ancestors()
                .find(|dir| dir.join(".git").is_dir())
                .map(|root| root.join("TRADES"))
        })
        .unwrap_or_else(|| PathBuf::from("TRADES"));
    base.join(DESK_DIR)
}

/// Stamp `fields` with `ts` and `kind`. Non-object payloads are nested
/// under `data`.
fn stamp(kind: &str, fields: Value) -> Value {
    let mut map = match fields {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".into(), other);
            map
        }
    };
    let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    map.insert("ts".into(), json!(ts));
    map.insert("kind".into(), json!(kind));
    Value::Object(map)
}

/// Append-only JSONL decision log, one file per UTC day.
pub struct TradeJournal {
    root: PathBuf,
    day: NaiveDate,
    file: File,
}

fn day_path(root: &Path, day: NaiveDate) -> PathBuf {
    root.join(format!("trades-{}.jsonl", day.format("%Y-%m-%d")))
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl TradeJournal {
    pub fn open(root: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&root)?;
        let day = Utc::now().date_naive();
        let file = open_append(&day_path(&root, day))?;
        Ok(Self { root, day, file })
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    pub fn current_file(&self) -> PathBuf {
        day_path(&self.root, self.day)
    }

    fn append(&mut self, event: &Value) -> std::io::Result<()> {
        let today = Utc::now().date_naive();
        if today != self.day {
            self.file = open_append(&day_path(&self.root, today))?;
            self.day = today;
        }
        writeln!(self.file, "{}", event)?;
        self.file.flush()
    }

    /// Journal one event. Write failures are logged and dropped.
    pub fn record(&mut self, kind: &str, fields: Value) {
        let event = stamp(kind, fields);
        if let Err(e) = self.append(&event) {
            warn!("journal write failed for {}: {}", kind, e);
        }
    }
}
