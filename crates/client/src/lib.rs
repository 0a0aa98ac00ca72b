#![forbid(unsafe_code)]

//! Client-side progress reporting.
//!
//! `ProgressReporter` is a pure state machine: callers feed it timestamps and
//! player events and it answers with the flushes to send. `ReporterDriver`
//! runs it on a tokio timer and ships flushes through a `FlushTransport`.

pub mod driver;
pub mod reporter;
pub mod transport;

pub use driver::ReporterDriver;
pub use reporter::{Flush, ProgressReporter, ReporterConfig, ReporterState, SectionTarget};
pub use transport::{FlushTransport, HttpTransport, HttpTransportConfig, TransportError};
