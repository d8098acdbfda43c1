//! Thin chaining wrapper over shell command execution.
//!
//! Each [`CommandChain`] runs one command line through `sh -c`, captures its
//! output streams, and can pipe that captured stdout into a further command.
//! Unlike an in-shell `|`, every link of the chain is its own independently
//! spawned process.
//!
//! ```
//! use cmdchain::{CommandChain, Invocation};
//!
//! # fn main() -> Result<(), cmdchain::Error> {
//! let manifest = CommandChain::invoke(Invocation::new("ls ."))?
//!     .chain(Invocation::new("grep").arg("Cargo"))?;
//! assert!(manifest.as_bool()?);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod chain;
pub mod errors;
pub mod invocation;

pub use chain::CommandChain;
pub use errors::{ArgumentError, Error};
pub use invocation::{Invocation, StreamMode};
