// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes for records and releases.

use serde::Serialize;
use std::time::Instant;

use crate::deploy::DeploymentRecord;
use crate::strategy::ReleaseInfo;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({elapsed:.1}s)");
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit("success", message),
        }
    }

    /// Print a non-fatal warning.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit("warning", message),
        }
    }

    /// Print a single record: details in normal mode, the id in quiet mode.
    pub fn record(&self, record: &DeploymentRecord) {
        match self.mode {
            OutputMode::Normal => print!("{}", describe(record)),
            OutputMode::Quiet => println!("{}", record.id),
            OutputMode::Json => print_json(record),
        }
    }

    /// Print records as a table, one id per line, or a JSON array.
    pub fn records(&self, records: &[DeploymentRecord]) {
        match self.mode {
            OutputMode::Normal => {
                if records.is_empty() {
                    println!("No deployments.");
                    return;
                }
                println!(
                    "{:<8}  {:<16}  {:<12}  {:<16}  {:<20}  CREATED",
                    "ID", "APP", "TRIGGER", "STATUS", "REF"
                );
                for r in records {
                    println!(
                        "{:<8}  {:<16}  {:<12}  {:<16}  {:<20}  {}",
                        r.id.short(),
                        r.app_key.as_str(),
                        r.trigger_name,
                        r.status.as_str(),
                        r.trigger_ref,
                        r.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            OutputMode::Quiet => {
                for r in records {
                    println!("{}", r.id);
                }
            }
            OutputMode::Json => print_json(&records),
        }
    }

    pub fn releases(&self, releases: &[ReleaseInfo]) {
        match self.mode {
            OutputMode::Normal => {
                if releases.is_empty() {
                    println!("No releases.");
                    return;
                }
                for r in releases {
                    let marker = if r.active { "*" } else { " " };
                    let when = r
                        .created_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    let size = r.size_bytes.map(format_bytes).unwrap_or_default();
                    let summary = r.summary.as_deref().unwrap_or("");
                    println!("{marker} {:<32}  {when:<19}  {size:>9}  {summary}", r.name);
                }
            }
            OutputMode::Quiet => {
                for r in releases {
                    println!("{}", r.name);
                }
            }
            OutputMode::Json => print_json(&releases),
        }
    }

    /// Print the plaintext approval token. It is shown exactly once.
    pub fn approval_token(&self, record: &DeploymentRecord, token: &str) {
        match self.mode {
            OutputMode::Normal => {
                println!("Approval required for {}.", record.id);
                println!("  token:   {token}");
                if let Some(expires) = record.approval.expires_at {
                    println!("  expires: {}", expires.format("%Y-%m-%d %H:%M:%S UTC"));
                }
            }
            OutputMode::Quiet => println!("{token}"),
            OutputMode::Json => print_json(&serde_json::json!({
                "event": "approval_required",
                "deployment": record.id,
                "token": token,
                "expires_at": record.approval.expires_at,
            })),
        }
    }

    fn emit(&self, event: &str, message: &str) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.start_time.map(|_| self.elapsed_secs()),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            println!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        println!("{json}");
    }
}

/// Multi-line human description of a record.
pub fn describe(record: &DeploymentRecord) -> String {
    let mut lines = vec![
        format!("Deployment {}", record.id),
        format!("  app:      {} ({})", record.app_name, record.app_key),
        format!(
            "  trigger:  {} [{}] {}",
            record.trigger_name, record.trigger_kind, record.trigger_ref
        ),
        format!("  status:   {}", record.status),
        format!("  author:   {}", record.author),
    ];
    if !record.commit_sha.is_empty() {
        lines.push(format!("  commit:   {}", record.commit_sha));
    }
    if let Some(ref release) = record.release_name {
        lines.push(format!("  release:  {release}"));
    }
    if let Some(ref by) = record.approval.approved_by {
        lines.push(format!("  approved: {by}"));
    }
    if let Some(ref by) = record.approval.rejected_by {
        let reason = record.approval.rejection_reason.as_deref().unwrap_or("");
        lines.push(format!("  rejected: {by} ({reason})"));
    }
    if let Some(code) = record.execution.exit_code {
        lines.push(format!("  exit:     {code}"));
    }
    if let Some(ms) = record.execution.duration_ms {
        lines.push(format!("  duration: {:.1}s", ms as f64 / 1000.0));
    }
    if let Some(ref output) = record.execution.output
        && !output.trim().is_empty()
    {
        lines.push("  output:".to_string());
        lines.extend(output.lines().map(|l| format!("    {l}")));
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
