#![warn(missing_docs)]
//! # Structured logging for dcache
//!
//! Every crate in the workspace logs through [`tracing`]. Nothing is printed
//! unless the embedding application installs a subscriber, which it does by
//! calling [`init_fmt`] once at startup with the [`Output`] it wants.
//!
//! ## Filtering
//! The filter is read from `RUST_LOG`:
//! ```bash
//! RUST_LOG='dcache=debug,dcache_fragment=trace' my_bin
//! ```
//! If `CUSTOM_FILTER` is also set it replaces the `RUST_LOG` filter entirely,
//! and a parse failure is reported on stderr instead of being ignored.
//!
//! Spans carry fields, so you can narrow in on a single channel:
//! ```bash
//! RUST_LOG='dcache[process{channel="peer123"}]=debug' my_bin
//! ```
//!
//! ## Json
//! `Output::Json` writes one JSON object per event, which is handy when
//! piping a long gossip session into `jq`.
//!
//! ## Tests
//! Call [`test_run`] at the top of a test. It does nothing unless `RUST_LOG`
//! is set, so test output stays quiet by default.

use tracing::Subscriber;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        format::{DefaultFields, Format},
        time::UtcTime,
        MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

use derive_more::Display;
use std::str::FromStr;

pub use tracing;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
/// Sets the kind of structured logging output you want
pub enum Output {
    /// More compact version of Log
    Compact,
    /// Outputs everything as json
    Json,
    /// Regular logging (default)
    Log,
    /// No logging to console
    None,
}

/// ParseError is a String
pub type ParseError = String;

impl FromStr for Output {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Json" => Ok(Output::Json),
            "Log" => Ok(Output::Log),
            "Compact" => Ok(Output::Compact),
            "None" => Ok(Output::None),
            _ => Err("Could not parse log output type".into()),
        }
    }
}

/// Run logging in a unit test.
///
/// RUST_LOG must be set or this is a no-op. Safe to call from every test:
/// only the first successful call installs the subscriber.
pub fn test_run() -> Result<(), errors::TracingError> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }

    match init_fmt(Output::Log) {
        // another test in this process got there first
        Err(errors::TracingError::SetGlobal(_)) => Ok(()),
        r => r,
    }
}

/// Build the canonical filter based on env
pub fn standard_filter() -> Result<EnvFilter, errors::TracingError> {
    let mut filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::from_default_env().add_directive("warn".parse()?),
    };
    if std::env::var("CUSTOM_FILTER").is_ok() {
        EnvFilter::try_from_env("CUSTOM_FILTER")
            .map_err(|e| eprintln!("Failed to parse CUSTOM_FILTER {:?}", e))
            .map(|f| {
                filter = f;
            })
            .ok();
    }
    Ok(filter)
}

/// Build a filter from an explicit directive string, e.g. a config override.
pub fn filter_from_directives(directives: &str) -> Result<EnvFilter, errors::TracingError> {
    Ok(EnvFilter::try_new(directives)?)
}

/// Return a layer builder directly, for times when you need more control over the
/// produced subscriber
pub fn standard_layer_unfiltered<W, S>(
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, DefaultFields, Format, W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    S: Subscriber + Send + Sync + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::Layer::default()
        .with_test_writer()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
}

/// This checks RUST_LOG for a filter but doesn't complain if there is none or it doesn't parse.
/// It then checks for CUSTOM_FILTER which if set will output an error if it doesn't parse.
pub fn init_fmt(output: Output) -> Result<(), errors::TracingError> {
    init_fmt_with_filter(output, standard_filter()?)
}

/// Same as [`init_fmt`] but with a caller-supplied filter.
pub fn init_fmt_with_filter(output: Output, filter: EnvFilter) -> Result<(), errors::TracingError> {
    init_fmt_with_opts(output, filter, std::io::stderr)
}

fn init_fmt_with_opts<W>(
    output: Output,
    filter: EnvFilter,
    writer: W,
) -> Result<(), errors::TracingError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match output {
        Output::Json => Registry::default()
            .with(
                standard_layer_unfiltered(writer)
                    .with_timer(UtcTime::rfc_3339())
                    .json()
                    .with_current_span(true)
                    .with_filter(filter),
            )
            .try_init()?,

        Output::Log => Registry::default()
            .with(standard_layer_unfiltered(writer).with_filter(filter))
            .try_init()?,

        Output::Compact => Registry::default()
            .with(
                standard_layer_unfiltered(writer)
                    .compact()
                    .with_filter(filter),
            )
            .try_init()?,

        Output::None => (),
    };
    Ok(())
}

pub mod errors {
    //! Error in the tracing/logging framework

    use thiserror::Error;

    /// Error in the tracing/logging framework
    #[allow(missing_docs)] // should be self-explanatory
    #[derive(Error, Debug)]
    pub enum TracingError {
        #[error(transparent)]
        SetGlobal(#[from] tracing_subscriber::util::TryInitError),
        #[error(transparent)]
        BadDirective(#[from] tracing_subscriber::filter::ParseError),
    }
}
