use serde_json::Value;

/// How a nullable text field in a partial update should be applied.
#[derive(Debug, PartialEq, Eq)]
pub enum TextPatch {
    Keep,
    Clear,
    Set(String),
}

impl TextPatch {
    /// Folds the patch onto the current value, returning `None` for `Keep`.
    pub fn into_change(self) -> Option<Option<String>> {
        match self {
            TextPatch::Keep => None,
            TextPatch::Clear => Some(None),
            TextPatch::Set(value) => Some(Some(value)),
        }
    }
}

/// Absent keeps the column, `null` or a blank string clears it.
pub fn classify_text_patch(field: &str, value: Option<&Value>) -> Result<TextPatch, String> {
    match value {
        None => Ok(TextPatch::Keep),
        Some(Value::Null) => Ok(TextPatch::Clear),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(TextPatch::Clear)
            } else {
                Ok(TextPatch::Set(trimmed.to_string()))
            }
        }
        Some(other) => Err(format!("{field} must be a string or null, got {other}")),
    }
}
