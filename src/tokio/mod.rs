//! Asynchronous driver using Tokio.

mod conn;
mod stream;

pub use conn::Conn;
pub use stream::Stream;
