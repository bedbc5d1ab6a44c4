//! Writer state machine.
//!
//! ```text
//!            budget exhausted            rotation failed
//!   Writing ─────────────────▶ Buffering ───────────────▶ Failed
//!      ▲                           │
//!      └───────────────────────────┘
//!            rotation succeeded
//!
//!   Writing ──close──▶ Closed
//! ```
//!
//! `Failed` and `Closed` are terminal. A close issued while `Buffering`
//! waits for the rotation outcome before it is applied.

use std::fs::File;
use std::io::Write;
use std::mem;
use std::sync::Arc;

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::policy::RotationPolicy;

/// Observable state of a [`RotatingWriter`](crate::RotatingWriter).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriterStatus {
    /// Appends go straight to the active file.
    Writing,
    /// A rotation is in flight; appends are buffered in memory.
    Buffering,
    /// A rotation failed; every call returns the stored error.
    Failed,
    /// The writer was closed.
    Closed,
}

#[derive(Debug)]
pub(crate) enum WriterState {
    Writing {
        file: File,
        remaining: i64,
    },
    Buffering {
        buffer: BytesMut,
    },
    Failed {
        error: Arc<Error>,
        // Bytes accepted during the failed rotation. Never flushed.
        retained: BytesMut,
    },
    Closed,
}

impl WriterState {
    pub(crate) const fn status(&self) -> WriterStatus {
        match self {
            Self::Writing { .. } => WriterStatus::Writing,
            Self::Buffering { .. } => WriterStatus::Buffering,
            Self::Failed { .. } => WriterStatus::Failed,
            Self::Closed => WriterStatus::Closed,
        }
    }

    /// Bytes held in memory, waiting for a drain or lost to a failure.
    pub(crate) fn buffered_len(&self) -> usize {
        match self {
            Self::Buffering { buffer } => buffer.len(),
            Self::Failed { retained, .. } => retained.len(),
            Self::Writing { .. } | Self::Closed => 0,
        }
    }

    /// `Writing → Buffering`, seeding the buffer with `payload`. Hands back
    /// the active file for the rotation worker.
    pub(crate) fn begin_rotation(&mut self, payload: &[u8]) -> Option<File> {
        match mem::replace(self, Self::Closed) {
            Self::Writing { file, .. } => {
                *self = Self::Buffering {
                    buffer: BytesMut::from(payload),
                };
                Some(file)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// `Buffering → Writing`: drains the buffer into the fresh file and
    /// resets the budget. Returns the number of bytes drained.
    pub(crate) fn finish_rotation(
        &mut self,
        mut file: File,
        policy: &RotationPolicy,
    ) -> Result<usize> {
        let Self::Buffering { buffer } = self else {
            return Ok(0);
        };

        file.write_all(&buffer[..])
            .map_err(|e| Error::io("error draining buffer into", &policy.path, e))?;

        let drained = buffer.len();
        *self = Self::Writing {
            file,
            remaining: policy.max_bytes.saturating_sub(byte_len(drained)),
        };

        Ok(drained)
    }

    /// `Buffering → Failed`, keeping the buffered bytes in memory.
    pub(crate) fn fail(&mut self, error: Error) -> Arc<Error> {
        let error = Arc::new(error);

        if let Self::Buffering { buffer } = self {
            let retained = mem::take(buffer);
            *self = Self::Failed {
                error: Arc::clone(&error),
                retained,
            };
        }

        error
    }
}

pub(crate) fn byte_len(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
