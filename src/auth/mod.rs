use axum::http::HeaderMap;
use serde_json::Value;


/// Resolve the bearer token of a request.
///
/// Sources in precedence order: `Authorization: Bearer <token>` header,
/// `?token=` query parameter, `token` field of the JSON body. The first
/// source present decides; a malformed header is not skipped.
pub fn resolve_token(
    headers: &HeaderMap,
    query_token: Option<&str>,
    body: Option<&Value>,
) -> Result<String, TokenError> {
    match extract_bearer_token(headers) {
        Err(TokenError::Missing) => {}
        decided => return decided,
    }

    if let Some(token) = query_token {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        return Ok(token.to_string());
    }

    match body {
        Some(body) => extract_token_from_body(body),
        None => Err(TokenError::Missing),
    }
}

/// Extract bearer token from HTTP Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Extract the `token` field of a JSON request body
pub fn extract_token_from_body(body: &Value) -> Result<String, TokenError> {
    let token = body
        .get("token")
        .ok_or(TokenError::Missing)?
        .as_str()
        .ok_or(TokenError::InvalidFormat)?;

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    // Scheme is case-insensitive
    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// No header, query parameter or body field carried a token
    Missing,
    /// Not "Bearer <token>", or a non-string body token
    InvalidFormat,
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}
