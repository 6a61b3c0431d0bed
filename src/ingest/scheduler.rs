//! Single-message and batch ingestion.
//!
//! Batch mode walks the input paths on the calling thread and feeds a
//! bounded queue drained by a fixed pool of scoped worker threads. Every
//! queued task carries a [`WaitGroup`] handle that its worker drops once the
//! task has been attempted, whatever the outcome, so the scheduler can wait
//! for all enumerated work before the caller flushes the sink.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::Sender;
use crossbeam_utils::sync::WaitGroup;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::pipeline::{to_source, Pipeline};
use crate::error::{IngestError, Result};
use crate::index::{BulkSink, DocumentIndex};
use crate::model::Document;

/// One unit of ingestion work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Stdin,
    File(PathBuf),
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Stdin => write!(f, "<stdin>"),
            Task::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Task {
    /// No arguments, or a lone `-`, means standard input.
    pub fn is_stdin(paths: &[PathBuf]) -> bool {
        match paths {
            [] => true,
            [only] => only.as_os_str() == "-",
            _ => false,
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Regular files queued.
    pub enumerated: usize,
    /// Files turned into a document and handed to the sink.
    pub indexed: usize,
    /// Files that could not be read, parsed or submitted.
    pub failed: usize,
    /// Entries that were not regular files.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub workers: usize,
    pub queue_capacity: usize,
}

/// Ingest one message from `reader` and index it with a direct request.
pub fn run_single(
    pipeline: &Pipeline<'_>,
    index: &dyn DocumentIndex,
    reader: impl Read,
) -> Result<Document> {
    let doc = pipeline.process_reader(reader)?;
    let source = to_source(&doc)?;
    index.index(&doc.id, &source)?;
    info!(id = doc.id.as_str(), task = %Task::Stdin, "Indexed message");
    Ok(doc)
}

/// Ingest every regular file under `paths` into `sink`.
///
/// Per-file failures are logged and counted. A path that cannot be stat'ed
/// or walked stops the run: tasks still queued are dropped unprocessed and
/// the error is returned once the workers have drained the queue.
///
/// `progress` is called with the number of finished tasks after each one.
pub fn run_batch(
    pipeline: &Pipeline<'_>,
    sink: &dyn BulkSink,
    paths: &[PathBuf],
    options: BatchOptions,
    progress: Option<&(dyn Fn(usize) + Sync)>,
) -> Result<BatchReport> {
    let workers = options.workers.max(1);
    let (sender, receiver) =
        crossbeam_channel::bounded::<(Task, WaitGroup)>(options.queue_capacity.max(1));

    let abort = AtomicBool::new(false);
    let indexed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let wait_group = WaitGroup::new();

    let enumeration = thread::scope(|scope| {
        for worker in 0..workers {
            let receiver = receiver.clone();
            let (abort, indexed, failed) = (&abort, &indexed, &failed);
            scope.spawn(move || {
                for (task, pending) in receiver.iter() {
                    if abort.load(Ordering::Relaxed) {
                        continue;
                    }
                    match process_task(pipeline, sink, &task) {
                        Ok(id) => {
                            debug!(worker = worker, task = %task, id = id.as_str(), "Queued for indexing");
                            indexed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(task = %task, error = %e, "Could not index message");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    drop(pending);
                    if let Some(progress) = progress {
                        progress(indexed.load(Ordering::Relaxed) + failed.load(Ordering::Relaxed));
                    }
                }
            });
        }
        drop(receiver);

        let enumeration = enumerate(paths, &sender, &wait_group);
        if enumeration.is_err() {
            abort.store(true, Ordering::Relaxed);
        }
        // Closing the queue lets the workers exit once it is drained.
        drop(sender);
        wait_group.wait();
        enumeration
    });

    let (enumerated, skipped) = enumeration?;
    Ok(BatchReport {
        enumerated,
        indexed: indexed.into_inner(),
        failed: failed.into_inner(),
        skipped,
    })
}

/// Returns the id the document was submitted under.
fn process_task(pipeline: &Pipeline<'_>, sink: &dyn BulkSink, task: &Task) -> Result<String> {
    let doc = match task {
        Task::File(path) => pipeline.process_file(path)?,
        Task::Stdin => pipeline.process_reader(io::stdin().lock())?,
    };
    let source = to_source(&doc)?;
    sink.add(&doc.id, source)?;
    Ok(doc.id)
}

/// Queue every regular file under `paths`. Returns (enumerated, skipped).
fn enumerate(
    paths: &[PathBuf],
    sender: &Sender<(Task, WaitGroup)>,
    wait_group: &WaitGroup,
) -> Result<(usize, usize)> {
    let mut enumerated = 0;
    let mut skipped = 0;

    let mut queue = |path: &Path| -> Result<()> {
        // Follows symlinks.
        let metadata = fs::metadata(path).map_err(|e| IngestError::io(path, e))?;
        if metadata.is_file() {
            sender
                .send((Task::File(path.to_path_buf()), wait_group.clone()))
                .map_err(|_| {
                    IngestError::io(
                        path,
                        io::Error::new(io::ErrorKind::BrokenPipe, "all workers exited"),
                    )
                })?;
            enumerated += 1;
        } else {
            info!(path = %path.display(), "Not a regular file, skipping");
            skipped += 1;
        }
        Ok(())
    };

    for root in paths {
        let metadata = fs::metadata(root).map_err(|e| IngestError::io(root, e))?;
        if !metadata.is_dir() {
            queue(root)?;
            continue;
        }
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            queue(entry.path())?;
        }
    }
    Ok((enumerated, skipped))
}
