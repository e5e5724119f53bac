//! Blocking driver: pumps bytes between a `Read + Write` transport and the
//! protocol engine.

mod conn;
mod stream;

pub use conn::Conn;
pub use stream::Stream;
