//! Ports - interfaces to every external collaborator.
//!
//! The core talks to the language model, the search engine, the chat
//! transport, the conversation store and the metrics consumer only through
//! these traits. HTTP implementations live in `impls`.

pub mod clock;
pub mod completion;
pub mod delivery;
pub mod event_sink;
pub mod history;
pub mod search;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::completion::{ChatMessage, CompletionBackend, CompletionRequest, Role};
pub use self::delivery::DeliverySink;
pub use self::event_sink::{ChannelEventSink, EventSink, NoopEventSink};
pub use self::history::{HistoryProvider, NoHistory};
pub use self::search::{SearchBackend, SearchDepth, SearchHit, SearchQuery};
