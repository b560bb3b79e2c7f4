//! Streaming batch API: emit file results as they complete.
//!
//! Unlike [`crate::extract::extract_files`], which returns only after every
//! file finishes, [`extract_stream`] yields each [`FileResult`] as soon as
//! it is ready. Files run concurrently, so results arrive in completion
//! order; sort by `path` if order matters.

use crate::config::ExtractionConfig;
use crate::extract::run_one;
use crate::output::FileResult;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-file results.
pub type FileStream = Pin<Box<dyn Stream<Item = FileResult> + Send>>;

/// Extract a set of payload files, streaming results as they are ready.
///
/// Per-file failures are reported inside the stream as [`FileResult`]s with
/// `error` set; the stream itself never fails.
///
/// # Example
/// ```rust,no_run
/// use nutrilabel::{extract_stream, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = ExtractionConfig::default();
/// let mut results = extract_stream(vec!["a.json".into(), "b.json".into()], &config);
/// while let Some(r) = results.next().await {
///     match (&r.output, &r.error) {
///         (Some(out), _) => println!("{}: {} nutrients", r.path, out.label.nutrients.len()),
///         (_, Some(e)) => eprintln!("{e}"),
///         _ => {}
///     }
/// }
/// # }
/// ```
pub fn extract_stream(paths: Vec<PathBuf>, config: &ExtractionConfig) -> FileStream {
    info!("Starting streaming extraction of {} files", paths.len());
    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(paths.into_iter().map(move |path| {
        let cfg = config.clone();
        async move { run_one(&path, &cfg).await }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_files_stream_as_errors() {
        let config = ExtractionConfig::default();
        let results: Vec<FileResult> = extract_stream(
            vec![PathBuf::from("/nonexistent/a.json"), PathBuf::from("/nonexistent/b.json")],
            &config,
        )
        .collect()
        .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.output.is_none() && r.error.is_some()));
    }
}
