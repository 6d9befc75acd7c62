//! gazelog-cli — command-line client for the Gazelog HTTP API
//!
//! # Subcommands
//! - `list [--offset N] [--limit N] [--json]` — newest sessions first
//! - `show <id> [--json]`                    — one session with its samples
//! - `upload <file.json> [--device LABEL]`   — ingest a recorded session
//! - `status`                                — show server health

use std::path::Path;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_LIMIT: u32 = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "gazelog-cli",
    version,
    about = "Gazelog eye-tracking session client"
)]
struct Cli {
    /// Gazelog HTTP server URL (overrides GAZELOG_HTTP_URL env var)
    #[arg(long, env = "GAZELOG_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List sessions, newest first
    List {
        /// Number of sessions to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Page size (the server caps this at 150)
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,

        /// Print the raw JSON page
        #[arg(long)]
        json: bool,
    },

    /// Show one session and its samples
    Show {
        /// Session id
        id: String,

        /// Print the raw JSON session
        #[arg(long)]
        json: bool,
    },

    /// Upload a recorded session from a JSON file
    Upload {
        /// Path to a JSON body with sample_rate, duration, recorded_at and samples
        file: String,

        /// Device descriptor sent as X-Device-Label
        #[arg(long)]
        device: Option<String>,
    },

    /// Show Gazelog server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub device_label: String,
    pub sample_rate: f64,
    pub duration: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    pub offset: u32,
    pub limit: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRow {
    pub timestamp: DateTime<Utc>,
    pub pos: f64,
}

#[derive(Debug, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: SessionSummary,
    pub samples: Vec<SampleRow>,
}

#[derive(Debug, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

// ============================================================================
// Formatting
// ============================================================================

/// One line per session: id, capture time, rate, duration, device.
pub fn format_summary_line(s: &SessionSummary) -> String {
    format!(
        "{}  {}  {:>7.2} Hz  {:>9.3} s  {}",
        s.id,
        s.created_at.format("%Y-%m-%d %H:%M:%S"),
        s.sample_rate,
        s.duration,
        s.device_label
    )
}

/// Milliseconds between the first and last sample, if there are any.
pub fn sample_span_ms(samples: &[SampleRow]) -> Option<i64> {
    let first = samples.first()?;
    let last = samples.last()?;
    Some((last.timestamp - first.timestamp).num_milliseconds())
}

fn print_error_and_exit(context: &str, status: reqwest::StatusCode, body: String) -> ! {
    eprintln!("gazelog-cli: {} — server returned {}: {}", context, status, body);
    std::process::exit(1);
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn do_list(server: &str, offset: u32, limit: u32, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/sessions", server);
    let resp = client(30)?
        .get(&url)
        .query(&[("offset", offset), ("limit", limit)])
        .send()?;

    if !resp.status().is_success() {
        let status = resp.status();
        print_error_and_exit("list failed", status, resp.text().unwrap_or_default());
    }

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let page: SessionPage = resp.json()?;
    if page.sessions.is_empty() {
        eprintln!("No sessions (offset {})", page.offset);
        return Ok(());
    }
    for s in &page.sessions {
        println!("{}", format_summary_line(s));
    }
    eprintln!(
        "{} session(s), offset {}, limit {}",
        page.count, page.offset, page.limit
    );

    Ok(())
}

fn do_show(server: &str, id: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/sessions/{}", server, id);
    let resp = client(60)?.get(&url).send()?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        eprintln!("gazelog-cli: no such session: {}", id);
        std::process::exit(1);
    }
    if !resp.status().is_success() {
        let status = resp.status();
        print_error_and_exit("show failed", status, resp.text().unwrap_or_default());
    }

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let detail: SessionDetail = resp.json()?;
    println!("{}", format_summary_line(&detail.session));
    match sample_span_ms(&detail.samples) {
        Some(span) => println!("Samples: {} over {} ms", detail.samples.len(), span),
        None => println!("Samples: 0"),
    }
    for s in &detail.samples {
        println!("  {}  {}", s.timestamp.to_rfc3339(), s.pos);
    }

    Ok(())
}

fn do_upload(server: &str, file: &str, device: Option<&str>) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(Path::new(file))?;
    let body: serde_json::Value = serde_json::from_str(&raw)?;

    let url = format!("{}/api/sessions", server);
    let mut req = client(120)?.post(&url).json(&body);
    if let Some(device) = device {
        req = req.header("X-Device-Label", device);
    }
    let resp = req.send()?;

    if !resp.status().is_success() {
        let status = resp.status();
        print_error_and_exit("upload failed", status, resp.text().unwrap_or_default());
    }

    let created: CreatedResponse = resp.json()?;
    println!("{}", created.id);
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client(10)?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Gazelog server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Storage:        {}", body["storage"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("gazelog-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("gazelog-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::List { offset, limit, json } => do_list(&server, offset, limit, json),
        Commands::Show { id, json } => do_show(&server, &id, json),
        Commands::Upload { file, device } => do_upload(&server, &file, device.as_deref()),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("gazelog-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mock_summary(device: &str) -> SessionSummary {
        SessionSummary {
            id: "7b5c24ab-1234-5678-9abc-def012345678".to_string(),
            device_label: device.to_string(),
            sample_rate: 60.0,
            duration: 1.235,
            created_at: Utc.with_ymd_and_hms(2025, 8, 16, 19, 15, 43).unwrap(),
        }
    }

    // ========================================================================
    // TEST 1: summary line carries id, time, rate, duration, device
    // ========================================================================
    #[test]
    fn test_summary_line_fields() {
        let line = format_summary_line(&mock_summary("webgazer"));
        assert!(line.starts_with("7b5c24ab-1234-5678-9abc-def012345678"));
        assert!(line.contains("2025-08-16 19:15:43"));
        assert!(line.contains("60.00 Hz"));
        assert!(line.contains("1.235 s"));
        assert!(line.ends_with("webgazer"));
    }

    // ========================================================================
    // TEST 2: sample span — empty, single, many
    // ========================================================================
    #[test]
    fn test_sample_span_ms() {
        assert_eq!(sample_span_ms(&[]), None);

        let t0 = Utc.with_ymd_and_hms(2025, 8, 16, 19, 15, 43).unwrap();
        let one = vec![SampleRow { timestamp: t0, pos: 0.1 }];
        assert_eq!(sample_span_ms(&one), Some(0));

        let many = vec![
            SampleRow { timestamp: t0, pos: 0.1 },
            SampleRow { timestamp: t0 + chrono::Duration::milliseconds(16), pos: 0.2 },
            SampleRow { timestamp: t0 + chrono::Duration::milliseconds(1250), pos: 0.3 },
        ];
        assert_eq!(sample_span_ms(&many), Some(1250));
    }

    // ========================================================================
    // TEST 3: session detail parses the server's flattened shape
    // ========================================================================
    #[test]
    fn test_session_detail_parses_flattened_body() {
        let body = serde_json::json!({
            "id": "7b5c24ab-1234-5678-9abc-def012345678",
            "device_label": "Unknown",
            "sample_rate": 30.0,
            "duration": 0.5,
            "created_at": "2025-08-16T19:15:43Z",
            "samples": [
                {"session_id": "7b5c24ab-1234-5678-9abc-def012345678",
                 "timestamp": "2025-08-16T19:15:43.016Z", "pos": 0.4}
            ]
        });
        let detail: SessionDetail = serde_json::from_value(body).unwrap();
        assert_eq!(detail.session.device_label, "Unknown");
        assert_eq!(detail.samples.len(), 1);
        assert_eq!(detail.samples[0].pos, 0.4);
    }

    // ========================================================================
    // TEST 4: session page parses
    // ========================================================================
    #[test]
    fn test_session_page_parses() {
        let body = serde_json::json!({
            "sessions": [serde_json::to_value(mock_summary("a")).unwrap()],
            "offset": 0,
            "limit": 20,
            "count": 1
        });
        let page: SessionPage = serde_json::from_value(body).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.sessions[0].device_label, "a");
    }
}
