//! Client side of the PostgreSQL frontend/backend protocol, version 3.
//!
//! # Layout
//!
//! - [`state`]: a sans-I/O engine. Bytes from the server go in, results,
//!   notices, notifications and COPY data come out, bytes for the server
//!   are queued. Messages may arrive split at any byte boundary.
//! - [`sync`] and [`tokio`]: thin drivers that move bytes between a
//!   transport and the engine.
//!
//! # Example
//!
//! ```no_run
//! use zero_pq::sync::Conn;
//! use zero_pq::Opts;
//!
//! fn main() -> zero_pq::error::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "postgres".into(),
//!         database: Some("mydb".into()),
//!         ..Default::default()
//!     };
//!
//!     let mut conn = Conn::new(opts)?;
//!
//!     let result = conn.exec("SELECT 1 AS num")?.into_result()?;
//!     println!("{:?}", result.get_value(0, 0));
//!
//!     conn.close()?;
//!     Ok(())
//! }
//! ```
//!
//! Driving the engine directly:
//!
//! ```
//! use zero_pq::state::{ConnectionStateMachine, NextResult};
//! use zero_pq::Opts;
//!
//! let mut engine = ConnectionStateMachine::new(&Opts::default());
//! engine.send_query("SELECT 1").unwrap();
//! assert_eq!(engine.pending_output()[0], b'Q');
//! assert!(matches!(engine.get_result(), NextResult::NeedMoreData));
//! ```

pub mod buffer_set;
pub mod error;
pub mod handler;
pub mod opts;
pub mod protocol;
pub mod result;
pub mod state;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use error::{Error, ErrorRecord, Result, Verbosity};
pub use handler::{CollectNoticeHandler, DropNoticeHandler, LogNoticeHandler, NoticeHandler};
pub use opts::{EnvOption, Opts};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use result::{AttrDesc, Field, FunctionValue, QueryResult, ResultStatus, Row};
pub use state::{ConnStatus, ConnectionStateMachine, NextResult};
