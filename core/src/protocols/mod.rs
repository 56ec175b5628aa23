//! Built-in hanging protocols

mod default;
mod mammo;

pub use default::{default_protocol, DEFAULT_PROTOCOL_ID};
pub use mammo::{mammography_protocol, MAMMO_PROTOCOL_ID};

use crate::types::Protocol;

/// Every built-in protocol, default first
pub fn builtin_protocols() -> Vec<Protocol> {
    vec![default_protocol(), mammography_protocol()]
}
