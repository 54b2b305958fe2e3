pub mod client;
pub mod parser;

pub use client::{ModelReply, VisionClient};
pub use parser::{extract_from_text, parse_model_reply, parse_structured, ParseSource};
