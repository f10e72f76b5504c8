//! # fleetcap-id
//!
//! Typed identifiers for the fleetcap capacity engine.
//!
//! Every identifier is `{prefix}_{ulid}`:
//!
//! - `srv_01HV4Z2WQXKJNM8GPQY6VBKC3D` for a baremetal server
//! - `alloc_01HV4Z3MXNKPQR9HSTZ7WCLD4E` for a capacity reservation
//! - `alrt_01HV4Z4NYPLTRS0JTUA8XDME5F` for a threshold alert
//!
//! The prefix keeps ids of different resources from being mixed up at the
//! type level and in logs; the ULID part sorts by creation time.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
