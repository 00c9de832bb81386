//! Core building blocks shared by every rotbot crate: the message bus,
//! configuration loading, workspace paths, the access-control store, and the
//! common error type.

pub mod access;
pub mod bus;
pub mod config;
pub mod error;
pub mod paths;

pub use error::{Result, RotbotError};
