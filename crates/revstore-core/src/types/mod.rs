//! Core type definitions used across the RevStore workspace.

pub mod id;

pub use id::*;
