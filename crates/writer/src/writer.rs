//! Producer-facing rotating writer.

use std::fs::File;
use std::io::{self, Write};
use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::file;
use crate::policy::RotationPolicy;
use crate::rotation::RotationWorker;
use crate::state::{WriterState, WriterStatus, byte_len};

/// State shared between a writer and its rotation worker.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) policy: RotationPolicy,
    pub(crate) state: Mutex<WriterState>,
    pub(crate) rotation_done: Condvar,
    pub(crate) rotations: AtomicU64,
}

/// Append-only log file that rotates itself once it outgrows its policy.
///
/// `write` never blocks on renames: when a payload would push the active
/// file past `max_bytes`, the file is handed to a background worker that
/// retires it to `<path>.1` while further writes accumulate in memory. The
/// buffer is drained into the fresh file, in call order, once the worker
/// finishes.
///
/// No logging happens while the state lock is held, so the writer can back
/// a `tracing` subscriber that its own worker logs through.
#[derive(Debug)]
pub struct RotatingWriter {
    shared: Arc<Shared>,
}

impl RotatingWriter {
    /// Opens (creating if needed) the active file for `policy`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the path cannot name a log file,
    /// or [`Error::Io`] if the file cannot be opened or inspected.
    pub fn open(policy: RotationPolicy) -> Result<Self> {
        policy.validate()?;

        let file = file::open_append(&policy.path, policy.parent_dir())?;
        let size = file
            .metadata()
            .map_err(|e| Error::io("error reading metadata of", &policy.path, e))?
            .len();

        info!(
            path = %policy.path.display(),
            max_bytes = policy.max_bytes,
            max_rotations = policy.max_rotations,
            size,
            "opened log writer"
        );

        let remaining = policy
            .max_bytes
            .saturating_sub(i64::try_from(size).unwrap_or(i64::MAX));

        Ok(Self {
            shared: Arc::new(Shared {
                policy,
                state: Mutex::new(WriterState::Writing { file, remaining }),
                rotation_done: Condvar::new(),
                rotations: AtomicU64::new(0),
            }),
        })
    }

    /// The policy this writer was opened with.
    pub fn policy(&self) -> &RotationPolicy {
        &self.shared.policy
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.shared.policy.path
    }

    /// Current state.
    pub fn status(&self) -> WriterStatus {
        self.shared.state.lock().status()
    }

    /// Number of rotations completed so far.
    pub fn rotations(&self) -> u64 {
        self.shared.rotations.load(Ordering::Acquire)
    }

    /// Bytes currently held in memory: pending a drain while a rotation is
    /// in flight, or stranded by a failed one.
    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().buffered_len()
    }

    /// Appends `bytes` to the log.
    ///
    /// Returns the number of bytes accepted, which is always the full
    /// payload on success.
    ///
    /// # Errors
    ///
    /// - [`Error::StickyFailure`] if a previous rotation failed.
    /// - [`Error::Closed`] after [`RotatingWriter::close`].
    /// - [`Error::Io`] if appending to the active file fails. The writer
    ///   stays usable.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let policy = &self.shared.policy;
        let mut state = self.shared.state.lock();

        match &mut *state {
            WriterState::Writing { file, remaining } => {
                if bytes.is_empty() {
                    return Ok(0);
                }

                let len = byte_len(bytes.len());
                if !crosses_threshold(policy, *remaining, len) {
                    file.write_all(bytes)
                        .map_err(|e| Error::io("error writing", &policy.path, e))?;
                    *remaining = remaining.saturating_sub(len);

                    return Ok(bytes.len());
                }
            }
            WriterState::Buffering { buffer } => {
                buffer.extend_from_slice(bytes);
                return Ok(bytes.len());
            }
            WriterState::Failed { error, .. } => {
                return Err(Error::StickyFailure(Arc::clone(error)));
            }
            WriterState::Closed => return Err(Error::Closed),
        }

        // This payload is the threshold crossing: it opens the buffer and
        // the active file goes to the worker.
        let Some(active) = state.begin_rotation(bytes) else {
            return Ok(bytes.len());
        };

        if let Err(e) = RotationWorker::spawn(Arc::clone(&self.shared), active) {
            let failure = state.fail(Error::io("error spawning rotation for", &policy.path, e));
            drop(state);
            self.shared.rotation_done.notify_all();

            error!(path = %policy.path.display(), error = %failure, "rotation failed");
        }

        Ok(bytes.len())
    }

    /// Blocks until no rotation is in flight.
    pub fn wait_for_rotation(&self) {
        let mut state = self.shared.state.lock();
        while state.status() == WriterStatus::Buffering {
            self.shared.rotation_done.wait(&mut state);
        }
    }

    /// Closes the writer, flushing and releasing the active file.
    ///
    /// An in-flight rotation is allowed to finish first so that buffered
    /// bytes reach the new file.
    ///
    /// # Errors
    ///
    /// - [`Error::StickyFailure`] if a rotation failed. The writer stays
    ///   `Failed`.
    /// - [`Error::Closed`] if the writer was already closed.
    /// - [`Error::Io`] if the final sync fails. The writer is still closed.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        let file = loop {
            match mem::replace(&mut *state, WriterState::Closed) {
                WriterState::Writing { file, .. } => break file,
                buffering @ WriterState::Buffering { .. } => {
                    *state = buffering;
                    self.shared.rotation_done.wait(&mut state);
                }
                WriterState::Failed { error, retained } => {
                    let sticky = Error::StickyFailure(Arc::clone(&error));
                    *state = WriterState::Failed { error, retained };
                    return Err(sticky);
                }
                WriterState::Closed => return Err(Error::Closed),
            }
        };
        drop(state);

        sync_and_release(file, &self.shared.policy.path)?;
        debug!(path = %self.path().display(), "closed log writer");

        Ok(())
    }
}

fn crosses_threshold(policy: &RotationPolicy, remaining: i64, len: i64) -> bool {
    // An empty file takes the payload whatever its size; the next write
    // rotates it.
    policy.rotation_enabled() && remaining < policy.max_bytes && remaining.saturating_sub(len) < 0
}

fn sync_and_release(mut file: File, path: &Path) -> Result<()> {
    file.flush()
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::io("error syncing", path, e))
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(*self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
