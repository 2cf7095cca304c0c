//! Helpers shared by the MySQL and PostgreSQL drivers.

pub mod stream;
pub mod tls;
pub mod version;

pub use stream::{chunked_rows, ROW_FETCH_BATCH};
pub use tls::{SslMode, TlsBuilder};
pub use version::ServerVersion;
