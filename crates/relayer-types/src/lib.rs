//! Shared domain types for the gas relayer.
//!
//! Everything that crosses a crate boundary lives here: relay requests parsed
//! from inbound pub/sub messages, reply envelopes, strategy decisions, the
//! transaction and receipt types handed to the ledger client, and the schema
//! machinery used to validate implementation-specific configuration tables.

pub mod decision;
pub mod errors;
pub mod receipt;
pub mod reply;
pub mod request;
pub mod transaction;
pub mod utils;
pub mod validation;

pub use decision::*;
pub use errors::*;
pub use receipt::*;
pub use reply::*;
pub use request::*;
pub use transaction::*;
pub use validation::*;

pub use alloy::primitives::{Address, Bytes, Selector, B256, U256};
