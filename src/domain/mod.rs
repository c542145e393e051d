//! Domain layer - Core types and port definitions
//!
//! This module defines the identity, outcome and store traits (ports)
//! that adapters implement, following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
