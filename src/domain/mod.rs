//! Core domain types for casevault (tenants, cases, keys, audit rows).

mod case;
mod types;

pub use case::*;
pub use types::*;
