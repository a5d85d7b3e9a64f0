//! Connection gatekeeper helpers: credential extraction and policy closes.
//!
//! Every authentication failure ends the same way for both WebSocket
//! services: an abnormal close with policy code 1008 and no further
//! processing. The client has to reconnect with a fresh credential.

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes};
use axum::http::{header, HeaderMap};
use serde::Deserialize;

pub const REASON_AUTH_REQUIRED: &str = "Authentication required";
pub const REASON_AUTH_FAILED: &str = "Authentication failed";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Extract token from query parameter or Authorization header
pub fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    // First try query parameter
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    // Then try Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Close frame for a rejected connection (1008, policy violation).
pub fn policy_close_frame(reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::from_static(reason),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_query_wins() {
        let query = WsQuery {
            token: Some("from-query".to_string()),
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(extract_token(&query, &headers).as_deref(), Some("from-query"));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let query = WsQuery { token: None };
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(extract_token(&query, &headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_no_token() {
        let query = WsQuery { token: None };
        let headers = HeaderMap::new();
        assert_eq!(extract_token(&query, &headers), None);
    }

    #[test]
    fn test_policy_close_frame_carries_1008_and_reason() {
        for reason in [REASON_AUTH_REQUIRED, REASON_AUTH_FAILED] {
            match policy_close_frame(reason) {
                Message::Close(Some(frame)) => {
                    assert_eq!(frame.code, close_code::POLICY);
                    assert_eq!(frame.code, 1008);
                    assert_eq!(frame.reason.as_str(), reason);
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }
}
