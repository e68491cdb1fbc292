//! Console and rolling file log output.
//!
//! Both outputs have their own level filter, read from the [`CONSOLE_LOG`]
//! and [`FILE_LOG`] environment variables (default: `INFO`). Console logs go
//! to stderr, so stdout only carries command output.
use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::Directive, layer::SubscriberExt};

/// The environment variable used to set the console log level filter.
pub const CONSOLE_LOG: &str = "CONSOLE_LOG";

/// The environment variable used to set the rolling file log level filter.
pub const FILE_LOG: &str = "FILE_LOG";

/// The filename suffix used for the rolling file logs.
pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender { source: InitError },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, clap::Args)]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[arg(long, env)]
    pub console_log_disabled: bool,

    /// Output format of console logs.
    #[arg(long, env, value_name = "FORMAT", default_value_t)]
    pub console_log_format: ConsoleLogFormat,

    /// Enable logging to files located in the specified DIRECTORY.
    #[arg(long, env, value_name = "DIRECTORY", group = "file_log")]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[arg(long, env, value_name = "PERIOD", requires = "file_log")]
    pub file_log_rotation_period: Option<RotationPeriod>,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum ConsoleLogFormat {
    /// Unstructured, human readable output.
    #[default]
    Plain,

    /// One JSON object per event.
    Json,
}

/// Supported periods when the log file is rolled over.
#[derive(Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}

/// Keeps the log outputs alive.
///
/// <div class="warning">
/// Name the guard variable appropriately, do not just use <code>let _ =</code>, as that will drop
/// immediately and buffered file log events are lost.
/// </div>
#[must_use = "dropping the guard flushes and stops the file log writer"]
pub struct TracingGuard {
    _file_log_guard: Option<WorkerGuard>,
}

/// Installs the configured log outputs as global default subscriber.
pub fn init(service_name: &'static str, options: &TelemetryOptions) -> Result<TracingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Sync + Send>> = Vec::new();

    if !options.console_log_disabled {
        let env_filter_layer = env_filter_builder(CONSOLE_LOG, LevelFilter::INFO);
        let console_output_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        layers.push(match options.console_log_format {
            ConsoleLogFormat::Plain => console_output_layer.with_filter(env_filter_layer).boxed(),
            ConsoleLogFormat::Json => console_output_layer
                .json()
                .with_filter(env_filter_layer)
                .boxed(),
        });
    }

    let mut file_log_guard = None;
    if let Some(file_log_directory) = &options.file_log_directory {
        let env_filter_layer = env_filter_builder(FILE_LOG, LevelFilter::INFO);
        let rotation_period = options.file_log_rotation_period.clone().unwrap_or_default();

        let file_appender = RollingFileAppender::builder()
            .rotation(rotation_period.into())
            .filename_prefix(service_name)
            .filename_suffix(FILE_LOG_SUFFIX)
            .build(file_log_directory)
            .context(InitRollingFileAppenderSnafu)?;
        let (writer, guard) = tracing_appender::non_blocking(file_appender);

        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter_layer)
                .boxed(),
        );
        file_log_guard = Some(guard);
    }

    let subscriber = Registry::default().with(layers);
    tracing::subscriber::set_global_default(subscriber)
        .context(SetGlobalDefaultSubscriberSnafu)?;

    Ok(TracingGuard {
        _file_log_guard: file_log_guard,
    })
}

/// Create an [`EnvFilter`] configured with the given environment variable and default [`Directive`].
fn env_filter_builder(env_var: &str, default_directive: impl Into<Directive>) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(env_var)
        .with_default_directive(default_directive.into())
        .from_env_lossy()
}
