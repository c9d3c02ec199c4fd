//! # chatcraft-error
//!
//! One error type for every chatcraft crate.
//!
//! - [`ErrorKind`] says what failed (`ModelTimeout`, `ActionNotFound`, ...)
//! - [`ErrorStatus`] says whether trying again makes sense
//! - the operation and key/value context say where, and with what inputs
//! - a wrapped source keeps the lower-level cause without exposing its type
//!
//! ```rust
//! use chatcraft_error::{Error, ErrorKind};
//!
//! fn lookup(name: &str) -> chatcraft_error::Result<()> {
//!     Err(Error::action_not_found(name).with_operation("registry::lookup"))
//! }
//!
//! assert_eq!(lookup("caps_lock_button").unwrap_err().kind(), ErrorKind::ActionNotFound);
//! ```
//!
//! Foreign errors are converted once, at the boundary where they appear, and
//! only gain context after that.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

pub type Result<T> = std::result::Result<T, Error>;
