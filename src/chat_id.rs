use crate::errors::AppError;

const MAX_ID_LEN: usize = 255;

/// Whether `id` is safe to use as a storage key: only `[A-Za-z0-9_-]`,
/// non-empty, shorter than 256 bytes. This is the defense against path
/// traversal when the id becomes a filename, and against malformed keys
/// when it becomes a database lookup.
pub fn validate(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validates `id`, returning it unchanged or `InvalidChatId`. Called before
/// any filesystem or database access.
pub fn sanitize(id: &str) -> Result<&str, AppError> {
    if validate(id) {
        Ok(id)
    } else {
        Err(AppError::InvalidChatId { id: id.to_string() })
    }
}
