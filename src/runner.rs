//! Single-flight task runner.
//!
//! Each user action spawns one dedicated worker thread that performs one
//! blocking archive operation and is discarded afterwards. The controlling
//! component owns at most one `TaskHandle` at a time; `join` consumes the
//! handle, so the type system itself rules out a second task starting before
//! the first has delivered its terminal result. There is no cancellation.

use crate::models::task::{TaskKind, TaskOutcome, TaskProgress};
use crate::system::archive::{
    create_archive, extract_archive, ArchiveProgressEvent, PackRequest, UnpackRequest,
};
use crate::utils::error::{PackdirError, Result};
use crate::utils::formatter::{format_file_size, pluralize};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;

/// Terminal state of a task: the final progress snapshot (always reading
/// 100%) and the single outcome.
#[derive(Debug)]
pub struct FinishedTask {
    pub progress: TaskProgress,
    pub outcome: TaskOutcome,
}

/// Owning handle to the one in-flight task.
pub struct TaskHandle {
    kind: TaskKind,
    progress_rx: Receiver<ArchiveProgressEvent>,
    join_handle: JoinHandle<Result<String>>,
    progress: TaskProgress,
}

impl TaskHandle {
    pub fn spawn_pack(request: PackRequest) -> TaskHandle {
        let (progress_tx, progress_rx) = mpsc::channel();
        let join_handle = std::thread::spawn(move || {
            let output_path = request.output_path();
            let summary = create_archive(&request, progress_tx)?;
            Ok(format!(
                "packed {} ({}) into '{}'",
                pluralize(summary.entries_written, "entry", "entries"),
                format_file_size(summary.bytes_processed),
                output_path.display()
            ))
        });
        TaskHandle {
            kind: TaskKind::Pack,
            progress_rx,
            join_handle,
            progress: TaskProgress::default(),
        }
    }

    pub fn spawn_unpack(request: UnpackRequest) -> TaskHandle {
        let (progress_tx, progress_rx) = mpsc::channel();
        let join_handle = std::thread::spawn(move || {
            let summary = extract_archive(&request, progress_tx)?;
            Ok(format!(
                "unpacked {} ({}) into '{}'",
                pluralize(summary.entries_written, "entry", "entries"),
                format_file_size(summary.bytes_processed),
                request.dest_dir.display()
            ))
        });
        TaskHandle {
            kind: TaskKind::Unpack,
            progress_rx,
            join_handle,
            progress: TaskProgress::default(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Drain pending worker events into the snapshot and return it.
    pub fn poll_progress(&mut self) -> &TaskProgress {
        while let Ok(event) = self.progress_rx.try_recv() {
            self.progress.observe(event);
        }
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Block until the worker ends and deliver the terminal result. A worker
    /// panic is folded into a `Failure` rather than propagated.
    pub fn join(mut self) -> FinishedTask {
        let outcome = match self.join_handle.join() {
            Ok(Ok(message)) => TaskOutcome::Success { message },
            Ok(Err(error)) => TaskOutcome::Failure { error },
            Err(_) => TaskOutcome::Failure {
                error: PackdirError::Unknown {
                    reason: format!("{} worker thread panicked", self.kind.name()),
                },
            },
        };

        while let Ok(event) = self.progress_rx.try_recv() {
            self.progress.observe(event);
        }
        self.progress.finish();

        FinishedTask {
            progress: self.progress,
            outcome,
        }
    }
}
