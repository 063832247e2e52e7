use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use sockwire_client::{Event, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    path: &'a str,
    event: &'a str,
    items: Vec<serde_json::Value>,
    ack_requested: bool,
    timestamp: String,
}

pub fn print_event(event: &Event, path: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                path,
                event: &event.name,
                items: event.items.iter().map(summarize).collect(),
                ack_requested: event.ack.is_some(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PATH", "EVENT", "ITEMS"])
                .add_row(vec![
                    path.to_string(),
                    event.name.clone(),
                    items_preview(&event.items),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "path={} event={} items={}{}",
                path,
                event.name,
                items_preview(&event.items),
                if event.ack.is_some() { " (ack requested)" } else { "" }
            );
        }
        OutputFormat::Raw => print_raw(&event.items),
    }
}

/// A lone binary item is written as-is; anything else as one JSON line.
fn print_raw(items: &[Value]) {
    let mut out = std::io::stdout();
    if let [Value::Binary(blob)] = items {
        let _ = out.write_all(blob);
    } else {
        let json = serde_json::Value::Array(items.iter().map(summarize).collect());
        let _ = writeln!(out, "{json}");
    }
    let _ = out.flush();
}

/// JSON rendering with blobs replaced by a size summary.
pub fn summarize(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Binary(blob) => serde_json::Value::String(binary_summary(blob.len())),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(summarize).collect()),
        Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), summarize(v))).collect(),
        ),
    }
}

fn items_preview(items: &[Value]) -> String {
    items
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn binary_summary(len: usize) -> String {
    format!("<binary {len} bytes>")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
