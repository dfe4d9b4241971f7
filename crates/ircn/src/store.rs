//! 🗄️ The configuration store — declarative config categories, loading
//! with cross-reference pruning, atomic persistence, bundles, and hot
//! reload. The filing cabinet of the operation, except the filing cabinet
//! notices when you move the files and reloads itself. 👀

pub mod bundle;
pub mod loader;
pub mod model;
pub mod watch;

pub use bundle::{ImportMode, ImportSummary};
pub use loader::{CascadeReport, ConfigStore, DeleteOutcome, LoadSummary, WriteOutcome};
pub use model::{
    BaseEvent, Category, ClientConfig, DiscoveryConfig, EventConfig, FileKind, FileTypeConfig,
    KnownUser, ParserRule, PathPattern, RateLimitConfig, ServerConfig, ServerDiscoveryConfig,
    SinkConfig, SinkKind, TemplateConfig, TemplateFormat,
};
pub use watch::{ConfigWatcher, RELOAD_DEBOUNCE};
