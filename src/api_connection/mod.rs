pub mod completion;
pub mod connection;
pub mod endpoints;

pub use completion::{OpenRouterCompletion, TextCompletionService};
pub use connection::ApiConnectionError;
