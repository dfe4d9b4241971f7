//! 👀 Per-file log tailers. Each watched path gets its own task owning
//! its read cursor; records flow into the pipeline channel. Like having
//! one very patient employee per file whose entire job is `tail -f`. 🦆

pub mod log_file;

pub use log_file::{LogFileWatcher, WatcherHandle};
