//! Message-oriented news network transport for sharevault: connection
//! pooling, the wire protocol, and priority-ordered failover with backoff.
//! Every other crate reaches sharevault's storage backend only through
//! [`Transport`].

mod conn;
mod error;
mod config;
mod pool;
mod transport;

pub use conn::{ConnState, Connection};
pub use config::ServerConfig;
pub use error::{classify_io, to_core_error, Classification};
pub use pool::{PooledGuard, ServerPool};
pub use transport::{CallOptions, Transport};
