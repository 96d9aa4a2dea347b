//! Runs one triage request against the configured HTTP collaborators and
//! prints the event stream as SSE frames.

use anyhow::Context;
use careflow::config::PipelineConfig;
use careflow::events::LoggingEventSink;
use careflow::observability::{init_tracing, LogFormat};
use careflow::service::{TriageRequest, TriageService};
use clap::Parser;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "careflow-cli", version, about = "Triage one request and print the event stream")]
struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Whose record to consult
    subject_id: String,

    /// Description of the problem
    symptoms: String,

    /// Task focus; the configured default applies when absent
    focus: Option<String>,
}

impl Cli {
    fn request(&self) -> TriageRequest {
        let request = TriageRequest::new(self.subject_id.clone(), self.symptoms.clone());
        match &self.focus {
            Some(focus) => request.with_focus(focus.clone()),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    init_tracing(format, "careflow=info")?;

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let runner = careflow::http::runner_from_config(config, Arc::new(LoggingEventSink::debug()))?;
    let service = TriageService::new(runner);

    let mut events = service.analyze_stream(&cli.request());
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        let frame = event?.to_sse_frame()?;
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;
    }

    service.runner().audit().flush().await;
    Ok(())
}
