#![forbid(unsafe_code)]

//! Command-line front end: downloads one item, a URL list, or a whole
//! profile through yt-dlp and prints a summary at the end.

use anyhow::{Context, Result};
use clap::Parser;
use reelfetch_tools::config::{RuntimeOverrides, RuntimeSettings, resolve_settings};
use reelfetch_tools::engine::{EngineCapabilities, Pacing, YtDlpEngine};
use reelfetch_tools::orchestrator::{BatchRequest, BatchSource};
use reelfetch_tools::progress::{ProgressEvent, ProgressWriter};
use reelfetch_tools::report::write_summary;
use reelfetch_tools::resolver::{Platform, resolve};
use reelfetch_tools::runner::{BatchJob, spawn_batch};
use reelfetch_tools::sources::{DEFAULT_URL_COLUMN, read_url_list};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

const ENGINE_UNAVAILABLE_EXIT: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "download_profile",
    about = "Download a single item, a list of URLs, or every item of a profile",
    version
)]
struct Cli {
    /// Item URL, or a profile URL together with --page.
    #[arg(required_unless_present = "list")]
    url: Option<String>,

    /// Base output directory (default: $DOWNLOAD_ROOT or ./downloads).
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Netscape cookies file passed to yt-dlp.
    #[arg(short = 'c', long = "cookies-file")]
    cookies_file: Option<PathBuf>,

    /// Treat URL as a profile and download its items.
    #[arg(long, requires = "url")]
    page: bool,

    /// Maximum number of items to download from a profile (default: 50).
    #[arg(long = "max-videos")]
    max_videos: Option<usize>,

    /// Text or CSV file with one URL per line or a URL column.
    #[arg(long, conflicts_with_all = ["url", "page"])]
    list: Option<PathBuf>,

    /// Column holding URLs in a CSV list.
    #[arg(long = "url-column", default_value = DEFAULT_URL_COLUMN)]
    url_column: String,

    /// Keep a JSON progress file up to date for external pollers.
    #[arg(long = "progress-file")]
    progress_file: Option<PathBuf>,

    /// Platform domain profile URLs must belong to.
    #[arg(long)]
    domain: Option<String>,

    /// Alternate .env file.
    #[arg(long = "env-file")]
    env_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            download_root: self.output_dir.clone(),
            cookies_file: self.cookies_file.clone(),
            max_items: self.max_videos,
            platform_domain: self.domain.clone(),
            env_path: self.env_file.clone(),
        }
    }
}

/// What the run downloads plus the name used in the banner and summary.
#[derive(Debug, PartialEq, Eq)]
struct Selection {
    source: BatchSource,
    subject: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = resolve_settings(cli.overrides()).context("loading settings")?;
    let platform = Platform::new(&settings.platform_domain);
    let selection = select_source(&cli, &platform)?;

    let capabilities = EngineCapabilities::detect();
    let engine = YtDlpEngine::new(&settings.engine_binary, capabilities);
    if let Err(err) = engine.ensure_available() {
        eprintln!("Error: {err}");
        return Ok(ExitCode::from(ENGINE_UNAVAILABLE_EXIT));
    }

    print_banner(&selection, &settings, capabilities);
    info!(subject = %selection.subject, root = %settings.download_root.display(), "starting");

    let job = BatchJob {
        engine: Arc::new(engine),
        platform,
        pacing: Pacing::default(),
        request: BatchRequest {
            source: selection.source,
            base_dir: settings.download_root.clone(),
            credentials: settings.cookies_file.clone(),
            max_items: settings.max_items,
        },
    };
    let progress = cli.progress_file.map(ProgressWriter::new);
    if let Some(writer) = &progress {
        writer.write(0, "Starting download");
    }

    let mut handle = spawn_batch(job);
    let cancel = handle.cancel_token();
    let mut reporter = ConsoleReporter::default();
    let mut interrupted = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                reporter.show(&event);
                if let Some(writer) = &progress {
                    writer.record(&event);
                }
            }
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    reporter.notice("Interrupted, stopping after the current item...");
                    cancel.cancel();
                }
            }
        }
    }

    let result = handle.join().await?;
    reporter.finish();
    let mut stdout = io::stdout().lock();
    writeln!(stdout)?;
    write_summary(&mut stdout, &result, &selection.subject).context("printing summary")?;

    let code = u8::try_from(result.exit_code()).unwrap_or(1);
    Ok(ExitCode::from(code))
}

fn select_source(cli: &Cli, platform: &Platform) -> Result<Selection> {
    if let Some(list) = &cli.list {
        let urls = read_url_list(list, &cli.url_column)?;
        return Ok(Selection {
            source: BatchSource::Urls(urls),
            subject: list.display().to_string(),
        });
    }

    let url = cli
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .context("a URL or --list is required")?;

    if cli.page {
        let handle = resolve(url, platform).with_context(|| {
            format!(
                "use --page with a profile URL like https://{}/username",
                platform.domain()
            )
        })?;
        return Ok(Selection {
            source: BatchSource::Collection(url.to_string()),
            subject: handle.to_string(),
        });
    }

    Ok(Selection {
        source: BatchSource::Urls(vec![url.to_string()]),
        subject: url.to_string(),
    })
}

fn print_banner(selection: &Selection, settings: &RuntimeSettings, capabilities: EngineCapabilities) {
    let rule = "=".repeat(50);
    println!("{rule}");
    match &selection.source {
        BatchSource::Collection(_) => {
            println!("Profile Downloader");
            println!("{rule}");
            println!("Profile: {}", selection.subject);
            println!("Max items: {}", settings.max_items);
        }
        BatchSource::Urls(urls) if urls.len() > 1 || urls.first() != Some(&selection.subject) => {
            println!("Batch Downloader");
            println!("{rule}");
            println!("List: {} ({} URLs)", selection.subject, urls.len());
        }
        BatchSource::Urls(_) => {
            println!("Item Downloader");
            println!("{rule}");
            println!("URL: {}", selection.subject);
        }
    }
    println!("Output directory: {}", settings.download_root.display());
    if let Some(cookies) = &settings.cookies_file {
        println!("Cookies: {}", cookies.display());
    }
    if !capabilities.merge_tool {
        println!("ffmpeg not found, falling back to single-file formats");
    }
    println!();
}

/// Renders events on stdout. Byte progress rewrites one line in place.
#[derive(Default)]
struct ConsoleReporter {
    inline: bool,
}

impl ConsoleReporter {
    fn show(&mut self, event: &ProgressEvent) {
        let Some(line) = console_line(event) else {
            return;
        };
        let mut out = io::stdout().lock();
        if matches!(event, ProgressEvent::Downloading { .. }) {
            let _ = write!(out, "\r{line}");
            self.inline = true;
        } else {
            self.end_inline(&mut out);
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
    }

    fn notice(&mut self, message: &str) {
        let mut out = io::stdout().lock();
        self.end_inline(&mut out);
        let _ = writeln!(out, "{message}");
    }

    fn finish(&mut self) {
        let mut out = io::stdout().lock();
        self.end_inline(&mut out);
        let _ = out.flush();
    }

    fn end_inline(&mut self, out: &mut impl Write) {
        if self.inline {
            let _ = writeln!(out);
            self.inline = false;
        }
    }
}

fn console_line(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::Downloading { .. } => event.summary().map(|(_, line)| line),
        ProgressEvent::ItemProgress {
            index,
            total,
            label,
        } => Some(format!("[{index}/{total}] Downloading: {label}")),
        ProgressEvent::Done { message, .. } => Some(message.clone()),
    }
}
