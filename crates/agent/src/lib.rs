//! The MiniLuma agent: the Reactor loop and the sessions built on it.
//!
//! A turn flows through these pieces:
//!
//! 1. **Receive** user input in an [`Assistant`] session
//! 2. **Answer** session commands (`-m<id>`, `-save`, `-autosave`) directly
//! 3. **Reason** with the [`Reactor`]: ask the model for a JSON action
//! 4. **Act** on `tool_use` actions and feed the observation back
//! 5. **Finish** on `final_response`, then archive generated files
//!
//! The loop ends on a final response or when the iteration budget runs out.

pub mod files;
pub mod logger;
pub mod reactor;
pub mod response;
pub mod session;
pub mod stream_event;
pub mod working_memory;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use files::{FileManager, extract_code_blocks};
pub use logger::{ConversationLogger, LogRecord};
pub use reactor::{IterationRecord, Reactor, ReactorAction, ReactorOutcome, ToolInvocation};
pub use response::{Incomplete, IncompleteKind, ResponseProcessor, detect_completions, extract_thought_process, format_for_display};
pub use session::{Assistant, SessionCommand, SessionError, TurnOutcome};
pub use stream_event::ReactorEvent;
pub use working_memory::{TraceEntry, TraceKind, WorkingMemory};
