//! [`PrintBackend`] implementation over the CUPS command line tools.
//!
//! Jobs are submitted with `lp`, observed with `lpstat`, and cancelled with
//! `cancel`. All invocations are bounded by a timeout; a timeout or a failure
//! to spawn is reported as [`BackendError::Unavailable`] and never touches
//! local job state.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tokio::process::Command;

use crate::job::{JobId, PrintOptions};

use super::{ActiveJob, BackendError, CompletedJob, PrintBackend};

const SUBMIT_MARKER: &str = "request id is ";

/// CUPS client invoking `lp`/`lpstat`/`cancel` on the local host.
#[derive(Debug, Clone)]
pub struct CupsBackend {
    timeout: Duration,
}

impl Default for CupsBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl CupsBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<std::process::Output, BackendError> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(BackendError::Unavailable(format!(
                "failed to run {program}: {err}"
            ))),
            Err(_) => Err(BackendError::Unavailable(format!(
                "{program} did not answer within {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl PrintBackend for CupsBackend {
    async fn submit(
        &self,
        file_ref: &Path,
        options: &PrintOptions,
    ) -> Result<JobId, BackendError> {
        let copies = options.copies().to_string();
        let sides = if options.duplex() {
            "sides=two-sided-long-edge"
        } else {
            "sides=one-sided"
        };
        let file = file_ref.to_string_lossy();
        let mut args = vec!["-o", sides];
        if options.copies() > 1 {
            args.extend(["-n", copies.as_str()]);
        }
        args.push(file.as_ref());

        let output = self.run("lp", &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_submit_output(&stdout).ok_or_else(|| {
            BackendError::Rejected(format!("no job id in scheduler reply: {}", stdout.trim()))
        })
    }

    async fn list_active(&self) -> Result<Vec<ActiveJob>, BackendError> {
        let output = self.run("lpstat", &["-o"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Unavailable(stderr.trim().to_owned()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_queue_line).collect())
    }

    async fn list_completed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CompletedJob>, BackendError> {
        let output = self.run("lpstat", &["-W", "completed", "-o"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Unavailable(stderr.trim().to_owned()));
        }
        let now = Utc::now();
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(|line| parse_completed_line(line, now))
            .filter(|job| job.completed_at >= since)
            .collect())
    }

    async fn cancel(&self, id: JobId) -> Result<(), BackendError> {
        let id_arg = i64::from(id).to_string();
        let output = self.run("cancel", &[id_arg.as_str()]).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        match classify_failure(stderr.trim()) {
            err @ BackendError::Unavailable(_) => Err(err),
            // Any other refusal means the job already left the active queue.
            _ => Err(BackendError::NotCancellable(id)),
        }
    }

    async fn available(&self) -> bool {
        match self.run("lpstat", &["-r"]).await {
            Ok(output) => {
                output.status.success()
                    && String::from_utf8_lossy(&output.stdout).contains("is running")
            }
            Err(_) => false,
        }
    }
}

/// Distinguishes "scheduler is down" from "scheduler refused this request"
/// in CUPS stderr text.
fn classify_failure(stderr: &str) -> BackendError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("unable to connect")
        || lowered.contains("not responding")
        || lowered.contains("scheduler is not running")
    {
        BackendError::Unavailable(stderr.to_owned())
    } else if stderr.is_empty() {
        BackendError::Rejected("scheduler refused the job".to_owned())
    } else {
        BackendError::Rejected(stderr.to_owned())
    }
}

/// Parses `lp` output of the shape `request id is printer-123 (1 file(s))`.
fn parse_submit_output(stdout: &str) -> Option<JobId> {
    let rest = &stdout[stdout.find(SUBMIT_MARKER)? + SUBMIT_MARKER.len()..];
    let request_id = rest.split_whitespace().next()?;
    parse_job_id(request_id)
}

/// Extracts the numeric tail of a CUPS request id such as `printer-123`.
fn parse_job_id(request_id: &str) -> Option<JobId> {
    request_id
        .rsplit('-')
        .next()?
        .parse::<i64>()
        .ok()
        .map(Into::into)
}

/// Parses one `lpstat -o` queue line: `printer-123 user 1024 <date>`.
///
/// `lpstat -o` prints no status word; everything it lists is sitting in the
/// live queue, which the adapter reports as raw `pending` and leaves to
/// [`super::normalize_status`].
fn parse_queue_line(line: &str) -> Option<ActiveJob> {
    let mut parts = line.split_whitespace();
    let request_id = parts.next()?;
    // user and size columns must be present for the line to be a job entry
    parts.next()?;
    parts.next()?;
    match parse_job_id(request_id) {
        Some(id) => Some(ActiveJob {
            id,
            raw_status: "pending".to_owned(),
        }),
        None => {
            tracing::warn!(line, "Skipping unparseable queue line");
            None
        }
    }
}

/// Parses one `lpstat -W completed -o` line.
///
/// The trailing date is locale-dependent; when it defeats parsing the entry
/// is still reported, timestamped with `fallback` (the time of the query).
fn parse_completed_line(line: &str, fallback: DateTime<Utc>) -> Option<CompletedJob> {
    let mut parts = line.split_whitespace();
    let request_id = parts.next()?;
    parts.next()?;
    parts.next()?;
    let id = match parse_job_id(request_id) {
        Some(id) => id,
        None => {
            tracing::warn!(line, "Skipping unparseable completed-jobs line");
            return None;
        }
    };
    let date_text = parts.collect::<Vec<_>>().join(" ");
    Some(CompletedJob {
        id,
        raw_status: "completed".to_owned(),
        completed_at: parse_cups_date(&date_text).unwrap_or(fallback),
    })
}

/// Best-effort parse of the date formats `lpstat` is known to emit.
fn parse_cups_date(text: &str) -> Option<DateTime<Utc>> {
    // Drop a trailing timezone name; chrono cannot resolve abbreviations.
    let trimmed = text
        .rsplit_once(' ')
        .filter(|(_, last)| last.chars().all(|c| c.is_ascii_alphabetic()) && last.len() <= 4)
        .map(|(head, _)| head)
        .unwrap_or(text);
    const FORMATS: &[&str] = &[
        "%a %b %d %H:%M:%S %Y", // Mon Nov 12 10:30:00 2025
        "%a %d %b %Y %r",       // Mon 12 Nov 2025 10:30:00 AM
        "%a %d %b %Y %H:%M:%S", // Mon 12 Nov 2025 10:30:00
    ];
    [text, trimmed]
        .iter()
        .flat_map(|candidate| {
            FORMATS
                .iter()
                .filter_map(|format| NaiveDateTime::parse_from_str(candidate, format).ok())
        })
        .next()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn submit_output_yields_numeric_job_id() {
        let id = parse_submit_output("request id is Brother_HL_L2350DW-417 (1 file(s))\n");
        assert_eq!(id, Some(417.into()));
    }

    #[test]
    fn submit_output_with_dashes_in_printer_name() {
        let id = parse_submit_output("request id is my-office-printer-9 (1 file(s))");
        assert_eq!(id, Some(9.into()));
    }

    #[test]
    fn submit_output_without_marker_is_rejected() {
        assert_eq!(parse_submit_output("lp: printing suspended"), None);
        assert_eq!(parse_submit_output(""), None);
    }

    #[test]
    fn submit_output_with_non_numeric_tail() {
        assert_eq!(parse_submit_output("request id is printer-abc (1 file(s))"), None);
    }

    #[test]
    fn queue_line_parses_job_id() {
        let job = parse_queue_line("printer-123 alice 1024 Mon Nov 12 10:30:00 2025").unwrap();
        assert_eq!(job.id, 123.into());
        assert_eq!(job.raw_status, "pending");
    }

    #[test]
    fn malformed_queue_lines_are_skipped() {
        assert!(parse_queue_line("").is_none());
        assert!(parse_queue_line("printer-123").is_none());
        assert!(parse_queue_line("printer-123 alice").is_none());
        assert!(parse_queue_line("no_dash_or_number alice 1024").is_none());
        assert!(parse_queue_line("printer-x1 alice 1024 date").is_none());
    }

    #[test]
    fn completed_line_parses_date() {
        let fallback = Utc::now();
        let job =
            parse_completed_line("printer-88 bob 2048 Wed Nov 12 10:30:00 2025", fallback).unwrap();
        assert_eq!(job.id, 88.into());
        assert_eq!(job.raw_status, "completed");
        assert_eq!(job.completed_at.hour(), 10);
        assert_ne!(job.completed_at, fallback);
    }

    #[test]
    fn completed_line_with_timezone_suffix() {
        let fallback = Utc::now();
        let job = parse_completed_line(
            "printer-5 bob 512 Wed 12 Nov 2025 10:30:00 GMT",
            fallback,
        )
        .unwrap();
        assert_ne!(job.completed_at, fallback);
    }

    #[test]
    fn completed_line_with_unparseable_date_uses_fallback() {
        let fallback = Utc::now();
        let job = parse_completed_line("printer-7 bob 512 someday soonish", fallback).unwrap();
        assert_eq!(job.completed_at, fallback);
    }

    #[test]
    fn scheduler_down_stderr_is_unavailable() {
        assert_matches!(
            classify_failure("lp: Unable to connect to server"),
            BackendError::Unavailable(_)
        );
        assert_matches!(
            classify_failure("lpstat: scheduler is not running"),
            BackendError::Unavailable(_)
        );
    }

    #[test]
    fn other_stderr_is_rejection() {
        assert_matches!(
            classify_failure("lp: no default destination"),
            BackendError::Rejected(_)
        );
        assert_matches!(classify_failure(""), BackendError::Rejected(_));
    }
}
