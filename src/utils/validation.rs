use crate::utils::error::{DivinationError, Result, MAX_QUESTION_CHARS};
use url::Url;

/// Validates the question text at submission time. Length is counted in
/// characters, not bytes, so CJK questions get the full budget.
pub fn validate_question(question: &str) -> Result<()> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(DivinationError::EmptyQuestion);
    }

    let length = trimmed.chars().count();
    if length > MAX_QUESTION_CHARS {
        return Err(DivinationError::QuestionTooLong {
            length,
            max: MAX_QUESTION_CHARS,
        });
    }

    Ok(())
}

/// A hexagram code is exactly six characters over {'0','1'}, top line first.
pub fn validate_hexagram_code(code: &str) -> Result<()> {
    if code.len() != 6 || !code.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(DivinationError::InvalidHexagramCode {
            code: code.to_string(),
        });
    }
    Ok(())
}

pub fn validate_base_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(DivinationError::ConfigError {
            message: format!("{field_name}: URL cannot be empty"),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(DivinationError::ConfigError {
                message: format!("{field_name}: unsupported URL scheme: {scheme}"),
            }),
        },
        Err(e) => Err(DivinationError::ConfigError {
            message: format!("{field_name}: invalid URL: {e}"),
        }),
    }
}
