//! Runtime core: the live session registry, the hook event pipeline, and
//! subscriber fan-out.
//!
//! Everything here is driven by a long-running process: the socket
//! listener, per-connection readers, handoff watchers, and the signal
//! pump are independent tokio tasks, while registry mutation stays behind
//! a single write lock.

mod discovery;
mod error;
mod events;
mod fanout;
mod handoff;
mod notifications;
mod ops;
mod pipeline;
mod registry;
mod settings;
mod socket;

pub use discovery::{discover_sessions, fresh_transcripts};
pub use error::{Error, Result};
pub use events::{
    BasicEvent, ContextUpdateEvent, DomainMessage, HookEvent, OperationCompleteEvent,
    RegistrySignal, SessionStartEvent, SubscriberRequest,
};
pub use fanout::{FanoutHub, SubscriberId, SUBSCRIBER_QUEUE_DEPTH};
pub use handoff::{HandoffEvent, HandoffWatcher};
pub use notifications::{
    Cooldowns, Notification, NotificationEngine, NotificationPriority,
    LARGE_OPERATION_HIGH_PRIORITY, NOTIFICATION_HISTORY_LIMIT,
};
pub use ops::{initialize_archive, rebuild_index, ArchiveSummary, Progress};
pub use pipeline::{
    spawn_handoff_pump, spawn_signal_pump, EventPipeline, NoopActivator, TerminalActivator,
};
pub use registry::{RegisterRequest, SessionRegistry};
pub use settings::{
    read_autocompact, write_autocompact, AutocompactSettings, AUTOCOMPACT_THRESHOLD_ENV,
};
pub use socket::{prepare_socket_path, run_socket_listener};
