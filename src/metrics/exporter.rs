//! Prometheus metrics export for one-shot runs.
//!
//! floe runs to completion rather than serving, so instead of an HTTP scrape
//! endpoint the rendered exposition text is written to a file when the run
//! ends, for the node exporter textfile collector to pick up.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::error::{MetricsError, MetricsSnafu, PrometheusInitSnafu, RunError, WriteTextfileSnafu};

/// Handle to the installed Prometheus recorder.
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

/// Install the Prometheus recorder as the global metrics recorder.
///
/// # Example
///
/// ```ignore
/// let exporter = floe::metrics::init()?;
/// // ... run uploads ...
/// exporter.write_textfile("/var/lib/node_exporter/floe.prom")?;
/// ```
pub fn init() -> Result<MetricsExporter, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;
    Ok(MetricsExporter { handle })
}

impl MetricsExporter {
    /// Render all recorded metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the rendered metrics to `path`.
    ///
    /// Writes to a sibling `.tmp` file first and renames it into place so a
    /// collector never reads a half-written file.
    pub fn write_textfile(&self, path: impl AsRef<Path>) -> Result<(), MetricsError> {
        let path = path.as_ref();
        let tmp: PathBuf = path.with_extension("prom.tmp");

        std::fs::write(&tmp, self.render()).context(WriteTextfileSnafu { path: tmp.clone() })?;
        std::fs::rename(&tmp, path).context(WriteTextfileSnafu { path })?;

        debug!("Wrote metrics textfile to {}", path.display());
        Ok(())
    }

    /// Write the textfile, when one is configured, at the end of a run.
    ///
    /// A failed run keeps its own error and the textfile failure is only
    /// logged; a successful run reports the textfile failure.
    pub fn finish_run<T>(
        &self,
        path: Option<&Path>,
        result: Result<T, RunError>,
    ) -> Result<T, RunError> {
        let Some(path) = path else {
            return result;
        };

        match (self.write_textfile(path), result) {
            (Ok(()), result) => result,
            (Err(e), Ok(_)) => Err(e).context(MetricsSnafu),
            (Err(e), Err(run)) => {
                error!(
                    "Failed to write metrics textfile: {}",
                    snafu::Report::from_error(&e)
                );
                Err(run)
            }
        }
    }
}
