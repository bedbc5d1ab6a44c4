//! Size-based rotating append-log writer.
//!
//! Producers append raw bytes to a [`RotatingWriter`] from any number of
//! threads. Once the active file would outgrow its [`RotationPolicy`], a
//! background worker retires it to `<path>.1`, shifting older files up the
//! chain and deleting those past the retention count, while new writes are
//! buffered in memory and drained into the fresh file afterwards. Writes
//! never wait on a rename, and bytes reach disk in the order their `write`
//! calls took the writer's lock.
//!
//! A [`WriterRegistry`] hands out one shared writer per path.
//!
//! ```no_run
//! use logroll_writer::{RotationPolicy, WriterRegistry};
//!
//! # fn main() -> logroll_writer::Result<()> {
//! let registry = WriterRegistry::new();
//! let writer = registry.open(RotationPolicy::new("logs/task.log", 10 << 20, 5))?;
//!
//! writer.write(b"task started\n")?;
//! registry.close_all();
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod file;
mod policy;
mod registry;
mod rotation;
mod state;
mod writer;

pub use config::LogConfig;
pub use error::{Error, Result};
pub use policy::{DEFAULT_MAX_BYTES, DEFAULT_MAX_ROTATIONS, RotationPolicy};
pub use registry::WriterRegistry;
pub use state::WriterStatus;
pub use writer::RotatingWriter;
