//! Local spool sinks.
//!
//! [`NdjsonFileSink`] appends each delivered batch to a newline-delimited JSON
//! file; [`StdoutSink`] writes the same encoding to standard output.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use logroute_core::record::Record;
use logroute_router::{RouterError, Sink};

/// Destination name that prints to stdout instead of a spool file.
pub const STDOUT_DESTINATION: &str = "stdout";

/// Encode a batch as NDJSON, one record per line.
pub fn encode_batch(destination: &str, records: &[Record]) -> Result<Vec<u8>, RouterError> {
    let mut buf = Vec::with_capacity(records.len() * 128);
    for record in records {
        serde_json::to_writer(&mut buf, record).map_err(|e| RouterError::Sink {
            destination: destination.to_owned(),
            reason: format!("failed to encode record: {e}"),
        })?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Appends batches to `<dir>/<destination>.ndjson`.
#[derive(Debug, Clone)]
pub struct NdjsonFileSink {
    destination: String,
    path: PathBuf,
}

impl NdjsonFileSink {
    /// Create a sink for `destination` under `dir`.
    ///
    /// Destination names containing path separators or `..` are rejected.
    pub fn new(dir: &Path, destination: &str) -> Result<Self, RouterError> {
        if destination.is_empty()
            || destination.contains(['/', '\\'])
            || destination.contains("..")
        {
            return Err(RouterError::Config {
                field: "destination".to_owned(),
                reason: format!("'{destination}' cannot be used as a spool file name"),
            });
        }
        Ok(Self {
            destination: destination.to_owned(),
            path: dir.join(format!("{destination}.ndjson")),
        })
    }

    /// Spool file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for NdjsonFileSink {
    fn send(&self, records: &[Record]) -> impl Future<Output = Result<(), RouterError>> + Send {
        let encoded = encode_batch(&self.destination, records);
        async move {
            let buf = encoded?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| RouterError::Sink {
                    destination: self.destination.clone(),
                    reason: format!("failed to open {}: {e}", self.path.display()),
                })?;
            file.write_all(&buf).await?;
            file.flush().await?;
            debug!(
                destination = %self.destination,
                path = %self.path.display(),
                bytes = buf.len(),
                "spooled batch"
            );
            Ok(())
        }
    }
}

/// Writes batches to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn send(&self, records: &[Record]) -> impl Future<Output = Result<(), RouterError>> + Send {
        let encoded = encode_batch(STDOUT_DESTINATION, records);
        async move {
            let buf = encoded?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&buf).await?;
            stdout.flush().await?;
            Ok(())
        }
    }
}
