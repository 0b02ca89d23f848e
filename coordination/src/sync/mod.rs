//! Mutual-exclusion primitives for the shared marking state

pub mod critical_section;

pub use critical_section::{CriticalSection, LockStats, SectionGuard};
