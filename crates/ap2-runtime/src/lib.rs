pub mod config;
pub mod engine;
pub mod events;
pub mod guard;
pub mod task;

// Convenience re-exports
pub use config::{RuntimeConfig, RuntimeConfigOverrides};
pub use engine::{CompletionOutcome, TransactionEngine};
pub use events::{
    FileTaskEmitter, MemoryTaskEmitter, NullTaskEmitter, TaskEvent, TaskEventEmitter,
};
pub use guard::{GuardError, MemoryNonceStore, NonceStore, SecurityFailureTracker, SqliteNonceStore};
pub use task::{
    MandateArtifact, Role, Task, TaskMessage, TaskState, TerminalResult, TransitionError,
};
