//! Endpoint URL helpers.

/// Joins a provider base URL and an endpoint path with exactly one slash.
///
/// Base URLs often come from environment variables, so surrounding
/// whitespace and trailing slashes are tolerated.
///
/// ```
/// use zero::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url(" http://localhost:11434/v1/ ", "/chat/completions"),
///     "http://localhost:11434/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let endpoint = endpoint.trim().trim_start_matches('/');
    format!("{base}/{endpoint}")
}
