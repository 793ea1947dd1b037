//! Cryptographic utilities: canonical JSON and result signatures.

mod canonical;

pub use canonical::*;
