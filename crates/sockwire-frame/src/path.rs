/// Path of the channel every session joins at handshake.
pub const DEFAULT_PATH: &str = "/";

/// Canonical form of a channel path: non-empty with a leading `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        DEFAULT_PATH.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
