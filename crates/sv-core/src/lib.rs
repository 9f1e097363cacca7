//! Shared foundation for the sharevault crates: the error contract every
//! subsystem converts into, opaque identifier types, and the startup
//! configuration object that replaces ambient global state.

pub mod context;
pub mod error;
pub mod ids;

pub use context::Config;
pub use error::{Error, Result};
pub use ids::{decode_base32, encode_base32, FolderId, MessageId, SessionId, ShareId, UserId};
