//! `tracing`/`tracing-subscriber` initialization, mirroring the teacher's
//! `TracingConfig` usage (`cloud-service/src/config.rs`): one human-readable
//! mode for interactive terminals, one JSON mode for `structured-stream`
//! output and CI logs.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    Pretty,
    Json,
}

pub fn init_tracing(log_level: &str, format: TracingFormat) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);

    match format {
        TracingFormat::Pretty => {
            let _ = subscriber.with_target(false).try_init();
        }
        TracingFormat::Json => {
            let _ = subscriber.json().try_init();
        }
    }
}
