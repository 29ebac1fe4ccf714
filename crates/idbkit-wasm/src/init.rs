use tracing::Level;
use tracing_subscriber::{
    fmt::format::Pretty, layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};
use tracing_web::{performance_layer, MakeWebConsoleWriter};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Route `tracing` events to the browser console and panics to `console.error`.
///
/// Safe to call more than once; only the first call installs a subscriber.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(log_level: Option<LogLevel>) {
    console_error_panic_hook::set_once();

    let level: Level = log_level.unwrap_or(LogLevel::Info).into();

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(false) // only partially supported across browsers
        .without_time() // time is not supported in wasm
        .with_writer(MakeWebConsoleWriter::new());

    let perf_layer = performance_layer().with_details_from_fields(Pretty::default());

    let installed = tracing_subscriber::registry()
        .with(perf_layer)
        .with(filter)
        .with(fmt)
        .try_init();
    if installed.is_err() {
        tracing::debug!("logging already initialized");
    }
}
