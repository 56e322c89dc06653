//! SSH session transport backed by libssh2
//!
//! `SshTransport` opens authenticated sessions for the connection pool and
//! `SshSession` runs one command per channel on them. libssh2 is blocking,
//! so every call runs on tokio's blocking thread pool.

mod error;
mod session;
mod transport;

pub use error::SshTransportError;
pub use session::SshSession;
pub use transport::SshTransport;
