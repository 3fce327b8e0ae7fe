//! LLM provider adapters for MiniLuma.
//!
//! All adapters implement `miniluma_core::Provider`. The router builds
//! them from configuration and falls back to the mock when a key is missing.

pub mod anthropic;
pub mod mock;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{AskReply, FALLBACK_MODEL, ProviderRouter, build_from_config, create_provider};
