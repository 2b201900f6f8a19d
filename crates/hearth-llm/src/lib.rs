//! LLM provider abstraction for Hearth.
//!
//! This crate defines the contract between the conversational core and the
//! concrete provider clients:
//!
//! - [`Message`]/[`Role`]/[`MessageContent`]: the provider-agnostic
//!   conversation model, including the image side-channel for multimodal
//!   user turns
//! - [`CompletionRequest`]/[`ToolSchema`]: what the core hands to a provider
//! - [`AiProvider`]: the provider trait, with optional streaming
//! - [`MockProvider`]: a scripted provider for deterministic tests
//!   (enable the `testing` feature to use it from downstream crates)

pub mod error;
pub mod provider;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use error::{LlmError, Result};
pub use provider::{AiProvider, EventStream, ProviderEvent, SharedProvider};
pub use types::{CompletionRequest, ImageAttachment, Message, MessageContent, Role, ToolSchema};

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockProvider, MockReply};
