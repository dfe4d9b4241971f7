//! 🔌 Client adapters — the configuration-driven bridge between a
//! client's on-disk log tree and structured message records.
//!
//! 🎭 This module is the casting agency. Textual? WeeChat? Some client
//! nobody has heard of that logs in its own artisanal format? Same
//! adapter, different JSON. One adapter per enabled client config;
//! adding a client kind is a config change, not a code change. 🦆

pub mod generic;
pub mod server_discovery;

pub use generic::{ClientAdapter, PathContext};
