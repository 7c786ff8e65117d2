//! Binary entry point for `highlight-bot`.
//!
//! Parses the command line, installs tracing (stdout plus an OTLP span
//! exporter), loads the configuration, and hands off to [`highlight_bot::start`].

use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing_subscriber::{filter::LevelFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};
use highlight_bot::base::{config::Config, types::Void};

/// Highlight-bot, private notifications for your highlight words in Slack.
///
/// Settings are read from `HIGHLIGHT_BOT_*` environment variables (for example
/// `HIGHLIGHT_BOT_SLACK_BOT_TOKEN`), layered over an optional TOML file.
/// Spans are exported over OTLP/HTTP to `OTEL_EXPORTER_OTLP_ENDPOINT`.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Path to a TOML config file.
    ///
    /// Without this flag, `.hidden/config.toml` is used if it exists; otherwise
    /// only the environment is consulted.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity: `-v` for DEBUG, `-vv` for TRACE.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    init_tracing(args.verbose)?;

    let config = Config::load(args.config.as_deref())?;

    highlight_bot::start(config).await
}

/// Install the global subscriber at the level selected by `verbose`.
fn init_tracing(verbose: u8) -> Void {
    let level_filter = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_target(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
    let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build()
        .tracer("highlight-bot");
    let otel = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    Ok(())
}
