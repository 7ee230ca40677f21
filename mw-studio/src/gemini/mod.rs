//! Generative AI transport (Gemini REST API)

pub mod client;
pub mod types;

pub use client::{GeminiClient, GeminiError, GenerativeBackend};
pub use types::{
    GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part, Schema,
    SchemaType,
};
