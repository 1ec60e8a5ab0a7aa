//! Outbound clients: the only two places where an upstream error is turned
//! into a plain value.

pub mod cleanup;
pub mod completion;
pub mod search;

pub use self::completion::{Completion, CompletionClient, CompletionOptions};
pub use self::search::{SearchClient, url_in_allowlist};
