//! Impls - adapters behind the ports.
//!
//! # Included
//! - **OpenAiBackend**: OpenAI-compatible chat completions over HTTP
//! - **TavilyBackend**: web search over HTTP
//! - **EchoBackend**: offline completion stand-in
//! - **InMemoryHistory**: per-session conversation window

mod http;

pub mod echo;
pub mod history;
pub mod openai;
pub mod tavily;

pub use self::echo::EchoBackend;
pub use self::history::InMemoryHistory;
pub use self::openai::OpenAiBackend;
pub use self::tavily::TavilyBackend;
