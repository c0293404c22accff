#![forbid(unsafe_code)]

//! [`MediaEngine`] backed by the `yt-dlp` binary.
//!
//! Every invocation goes through [`YtDlpEngine::command`], so tests can point
//! the engine at a stub script instead of the real binary.

use super::{ByteSink, EngineCapabilities, FetchReport, FetchRequest, MediaEngine, Pacing, RawEntry};
use crate::error::EngineError;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use tracing::debug;
use url::Url;

pub const DEFAULT_BINARY: &str = "yt-dlp";
pub const DEFAULT_RETRIES: u32 = 3;
pub const FILENAME_TEMPLATE: &str = "%(uploader)s_%(id)s.%(ext)s";
const MERGED_FORMAT: &str = "bestvideo+bestaudio/best";
const SINGLE_FORMAT: &str = "best";
const PROGRESS_MARKER: &str = "[reelfetch-progress]";
const PROGRESS_TEMPLATE: &str = "download:[reelfetch-progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

// Lowercased stderr fragments that mean retrying the same URL is pointless.
const FATAL_MARKERS: &[&str] = &[
    "unsupported url",
    "is not a valid url",
    "private",
    "not available",
    "has been removed",
    "does not exist",
    "http error 404",
];

/// Options applied to every single-item fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub retries: u32,
    pub format_selection: String,
    pub filename_template: String,
    pub overwrite: bool,
    pub playlist_expansion: bool,
}

impl FetchOptions {
    /// Separate best video+audio needs the merge tool; without it we settle
    /// for the best single-file format.
    pub fn for_capabilities(capabilities: EngineCapabilities) -> Self {
        let format_selection = if capabilities.merge_tool {
            MERGED_FORMAT
        } else {
            SINGLE_FORMAT
        };
        Self {
            retries: DEFAULT_RETRIES,
            format_selection: format_selection.to_string(),
            filename_template: FILENAME_TEMPLATE.to_string(),
            overwrite: false,
            playlist_expansion: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    binary: PathBuf,
    options: FetchOptions,
}

/// Minimal view of `--dump-single-json --flat-playlist` output.
#[derive(Deserialize)]
struct PlaylistDump {
    #[serde(default)]
    entries: Vec<Option<RawEntry>>,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<PathBuf>, capabilities: EngineCapabilities) -> Self {
        Self::with_options(binary, FetchOptions::for_capabilities(capabilities))
    }

    pub fn with_options(binary: impl Into<PathBuf>, options: FetchOptions) -> Self {
        Self {
            binary: binary.into(),
            options,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Runs `<binary> --version` so callers can fail loudly before a batch.
    pub fn ensure_available(&self) -> Result<(), EngineError> {
        let status = self
            .command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(self.unavailable(format!("--version exited with {status}"))),
            Err(err) => Err(self.unavailable(err.to_string())),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    fn unavailable(&self, reason: String) -> EngineError {
        EngineError::Unavailable {
            binary: self.binary.display().to_string(),
            reason,
        }
    }

    fn fetch_args(&self, request: &FetchRequest<'_>) -> Vec<OsString> {
        let template = request.output_dir.join(&self.options.filename_template);
        let mut args: Vec<OsString> = vec![
            "--format".into(),
            self.options.format_selection.clone().into(),
            "--output".into(),
            template.into_os_string(),
            "--retries".into(),
            self.options.retries.to_string().into(),
            "--restrict-filenames".into(),
            "--newline".into(),
            "--progress-template".into(),
            PROGRESS_TEMPLATE.into(),
        ];
        args.push(if self.options.overwrite {
            "--force-overwrites".into()
        } else {
            "--no-overwrites".into()
        });
        args.push(if self.options.playlist_expansion {
            "--yes-playlist".into()
        } else {
            "--no-playlist".into()
        });
        if let Some(cookies) = request.credentials {
            args.push("--cookies".into());
            args.push(cookies.as_os_str().to_owned());
        }
        args.push(request.url.into());
        args
    }

    fn enumerate_args(
        &self,
        collection_url: &str,
        max_items: usize,
        pacing: &Pacing,
        credentials: Option<&Path>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--flat-playlist".into(),
            "--dump-single-json".into(),
            "--no-warnings".into(),
            "--playlist-end".into(),
            max_items.to_string().into(),
            "--sleep-requests".into(),
            seconds(pacing.min_delay.as_secs_f64()).into(),
            "--sleep-interval".into(),
            seconds(pacing.min_delay.as_secs_f64()).into(),
            "--max-sleep-interval".into(),
            seconds(pacing.max_delay().as_secs_f64()).into(),
        ];
        if let Some(cookies) = credentials {
            args.push("--cookies".into());
            args.push(cookies.as_os_str().to_owned());
        }
        args.push(collection_url.into());
        args
    }
}

impl MediaEngine for YtDlpEngine {
    fn name(&self) -> &str {
        DEFAULT_BINARY
    }

    fn fetch(&self, request: &FetchRequest<'_>, on_bytes: &mut ByteSink<'_>) -> FetchReport {
        if let Err(err) = Url::parse(request.url) {
            return FetchReport::fatal(format!("malformed URL {}: {err}", request.url));
        }
        if let Err(err) = fs::create_dir_all(request.output_dir) {
            return FetchReport::fatal(format!(
                "creating {}: {err}",
                request.output_dir.display()
            ));
        }

        let args = self.fetch_args(request);
        debug!(binary = %self.binary.display(), ?args, "starting fetch");

        let mut child = match self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) if is_missing_binary(&err) => {
                return FetchReport::unavailable(self.unavailable(err.to_string()).to_string());
            }
            Err(err) => {
                return FetchReport::transient(format!("could not start {}: {err}", DEFAULT_BINARY));
            }
        };

        // stderr is drained on its own thread so a chatty engine cannot stall
        // while we read progress lines from stdout.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if let Some((done, total)) = parse_progress_line(&line) {
                    on_bytes(done, total);
                }
            }
        }

        let status = child.wait();
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match status {
            Ok(status) if status.success() => FetchReport::succeeded(),
            Ok(status) => classify_failure(&stderr, status),
            Err(err) => FetchReport::transient(format!("waiting for {}: {err}", DEFAULT_BINARY)),
        }
    }

    fn enumerate_metadata(
        &self,
        collection_url: &str,
        max_items: usize,
        pacing: &Pacing,
        credentials: Option<&Path>,
    ) -> Result<Vec<RawEntry>, EngineError> {
        let args = self.enumerate_args(collection_url, max_items, pacing, credentials);
        debug!(binary = %self.binary.display(), ?args, "listing collection");

        let output = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                if is_missing_binary(&err) {
                    self.unavailable(err.to_string())
                } else {
                    EngineError::Failed {
                        operation: "metadata enumeration",
                        detail: err.to_string(),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed {
                operation: "metadata enumeration",
                detail: last_error_line(&stderr)
                    .unwrap_or_else(|| format!("exited with {}", output.status)),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        let dump: PlaylistDump = serde_json::from_str(stdout.trim())?;
        Ok(dump.entries.into_iter().flatten().collect())
    }
}

fn is_missing_binary(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

fn seconds(value: f64) -> String {
    format!("{value}")
}

/// Parses `[reelfetch-progress] <done> <total> <estimate>`; the engine prints
/// `NA` for unknown values and floats for estimates.
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace().map(parse_byte_count);
    let done = fields.next().flatten()?;
    let total = fields.next().flatten();
    let estimate = fields.next().flatten();
    Some((done, total.or(estimate)))
}

fn parse_byte_count(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64)
    })
}

fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("ERROR:"))
        .map(|line| line.trim().to_string())
}

fn classify_failure(stderr: &str, status: ExitStatus) -> FetchReport {
    let detail = last_error_line(stderr).unwrap_or_else(|| format!("exited with {status}"));
    let lowered = detail.to_ascii_lowercase();
    if FATAL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        FetchReport::fatal(detail)
    } else {
        FetchReport::transient(detail)
    }
}
