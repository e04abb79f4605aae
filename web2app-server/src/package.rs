//! Android package identifiers derived from app names.

/// Lowercase `app_name` and keep only ASCII letters and digits.
pub fn sanitize_app_name(app_name: &str) -> String {
    app_name
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// `com.<namespace>.<sanitized app name>`.
///
/// Two apps whose names sanitize identically get the same identifier;
/// nothing here enforces uniqueness.
pub fn derive_package_name(namespace: &str, app_name: &str) -> String {
    format!("com.{namespace}.{}", sanitize_app_name(app_name))
}
