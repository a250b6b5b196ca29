//! Concrete [`forge_core::provider::Provider`] adapters.

mod anthropic;
mod chat_completions;
mod http;
mod static_provider;

pub use anthropic::AnthropicProvider;
pub use chat_completions::ChatCompletionsProvider;
pub use static_provider::StaticProvider;
