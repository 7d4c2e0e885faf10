use std::path::Path;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Sanitizes a logical filename to prevent path traversal.
/// Returns the sanitized filename or an error if the name is invalid.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Get only the filename component (remove any path)
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        });
    }

    if filename.contains("..") || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    // Remove dangerous characters, keep only safe ones
    // We allow most Unicode characters but block path separators and reserved characters
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == '/'
                || c == '\\'
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    // Names starting with '.' are reserved for in-flight temp files
    if sanitized.starts_with('.') {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filenames starting with '.' are not allowed".to_string(),
        });
    }

    Ok(sanitized)
}

/// Validates an opaque correlation token that will name an output file.
/// Unlike filenames, tokens are never rewritten: anything suspicious is rejected.
pub fn validate_identifier(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() || token.len() > 128 {
        return Err(ValidationError {
            code: "INVALID_IDENTIFIER",
            message: "Identifier must be between 1 and 128 characters".to_string(),
        });
    }

    if token.starts_with('.')
        || token
            .chars()
            .any(|c| c.is_control() || c == '/' || c == '\\')
    {
        return Err(ValidationError {
            code: "INVALID_IDENTIFIER",
            message: format!("Identifier contains forbidden characters: {}", token),
        });
    }

    Ok(())
}
