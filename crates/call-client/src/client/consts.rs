pub const CALL_TOKEN: &str = "CALL_TOKEN";
pub const CALL_RELAY_URL: &str = "CALL_RELAY_URL";

pub const BASE_URL: &str = "ws://127.0.0.1:8787/call";

pub const AUTHORIZATION_HEADER: &str = "Authorization";
