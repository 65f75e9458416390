//! Component identifiers.

/// Identifier of a simulation component, assigned sequentially from 0 on registration.
pub type Id = u32;
