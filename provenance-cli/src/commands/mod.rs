//! Subcommand implementations.

pub mod anchor;
pub mod hash;
pub mod manifest;
pub mod resolve;
pub mod sign_proof;
pub mod upload;
pub mod verify;
