//! Text-generation and text-extraction ports (outbound).
//!
//! Both collaborators are opaque: the core hands over a prompt or a blob and
//! stores whatever well-formed text comes back.

use crate::domain::DemandError;

/// Generates free-form text for a prompt.
pub trait Assistant {
    fn complete(&self, prompt: &str) -> Result<String, DemandError>;
}

/// Extracts readable text from an uploaded document.
pub trait TextExtractor {
    fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String, DemandError>;
}
