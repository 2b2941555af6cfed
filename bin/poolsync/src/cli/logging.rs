// This file is part of Poolsync.
//
// Poolsync is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Poolsync is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Poolsync.
// If not, see https://www.gnu.org/licenses/.

use std::io;

use tracing::subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use super::LogsArgs;

const DEFAULT_FILTER: &str = "info";

// reqwest's connection stack is chatty below warn
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "rustls"];

/// Install the global subscriber. Logs go to `--log.file` when set, else stdout.
///
/// The returned guard flushes the writer on drop and must outlive the run.
pub(crate) fn configure_logging(config: &LogsArgs) -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = match &config.file {
        Some(log_file) => {
            tracing_appender::non_blocking(tracing_appender::rolling::never(".", log_file))
        }
        None => tracing_appender::non_blocking(io::stdout()),
    };

    let (json, compact) = if config.json {
        (Some(fmt::layer().with_writer(writer).json()), None)
    } else {
        (None, Some(fmt::layer().with_writer(writer).compact()))
    };
    subscriber::set_global_default(
        Registry::default()
            .with(env_filter()?)
            .with(json)
            .with(compact),
    )?;
    LogTracer::init()?;

    Ok(guard)
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    for target in QUIET_TARGETS {
        filter = filter.add_directive(format!("{target}=warn").parse()?);
    }
    Ok(filter)
}
