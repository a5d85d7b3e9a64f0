mod claims;
mod gate;
mod jwt;

pub use claims::Claims;
pub use gate::{
    extract_token, policy_close_frame, WsQuery, REASON_AUTH_FAILED, REASON_AUTH_REQUIRED,
};
pub use jwt::JwtValidator;
