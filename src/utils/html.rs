use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based sanitization: safe tags (like <b>, <p>) survive,
/// dangerous tags (like <script>, <iframe>) and attributes (like onclick)
/// are stripped. Applied to instructor-authored lesson bodies and review
/// comments before they reach the database.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
