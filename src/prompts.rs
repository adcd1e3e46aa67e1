//! Instruction prompts for the vision OCR engine.
//!
//! Centralising the prompt text here keeps it in one place and lets unit
//! tests inspect it without spinning up a real engine. Callers override it
//! via [`crate::config::EngineConfig::prompt`]; the constants are used only
//! when no override is provided.

/// Default page-extraction instruction sent alongside every page image.
pub const DEFAULT_PROMPT: &str = r#"Extract the text from the above document as if you were reading it naturally. Return the tables in html format. Return the equations in LaTeX representation. If there is an image in the document and image caption is not present, add a small description of the image inside the <img></img> tag; otherwise, add the image caption inside <img></img>. Watermarks should be wrapped in brackets. Ex: <watermark>OFFICIAL COPY</watermark>. Page numbers should be wrapped in brackets. Ex: <page_number>14</page_number> or <page_number>9/22</page_number>. Prefer using ☐ and ☑ for check boxes."#;

/// Default system message accompanying the extraction prompt.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_covers_structured_constructs() {
        assert!(DEFAULT_PROMPT.contains("tables in html"));
        assert!(DEFAULT_PROMPT.contains("LaTeX"));
        assert!(DEFAULT_PROMPT.contains("<watermark>"));
        assert!(DEFAULT_PROMPT.contains("<page_number>"));
    }
}
