//! Masking for credential values shown in diagnostics.

/// Mask a secret for display: `first8...last4` when longer than 12 characters,
/// `***` otherwise.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Whether a setting or variable name looks like it holds a credential.
pub fn is_secret_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.contains("KEY") || upper.contains("TOKEN") || upper.contains("SECRET")
}

/// Mask `value` if `name` looks like a credential, otherwise return it unchanged.
pub fn display_value(name: &str, value: &str) -> String {
    if is_secret_name(name) {
        mask_secret(value)
    } else {
        value.to_string()
    }
}
