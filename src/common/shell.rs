//! Shell utility functions
//!
//! Remote commands are plain strings handed to the remote login shell, so
//! every value interpolated into one goes through [`shell_quote`].

/// Escape a string for use in a shell command
///
/// This function quotes the string only if necessary (i.e., if it contains characters
/// that have special meaning in the shell). It uses single quotes for safety.
/// Package names, `name=version` pairs and epoch versions (`1:2.3`) pass
/// through untouched.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars().all(|c| {
        c.is_alphanumeric() || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ',' | '+' | '%' | '~')
    }) {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}
