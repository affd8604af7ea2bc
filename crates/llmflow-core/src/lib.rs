pub mod error;
pub mod message;
pub mod provider;
pub mod registry;
pub mod retry;

pub use error::{ExecutionError, ProviderError};
pub use message::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, ContentBlock, FinishReason, ImageMime,
    ImageRequest, ImageResponse, Message, Role, StructuredOutputSpec, ToolCall, ToolChoice,
    ToolDefinition, Usage,
};
pub use provider::{prefix_match_len, ProviderAdapter};
pub use registry::ProviderRegistry;
pub use retry::{call_with_retry, RetryPolicy};
