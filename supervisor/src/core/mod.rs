//! Core business logic modules
//!
//! This module contains pure business logic with no I/O dependencies.
//! All functions are deterministic and easily testable.

pub mod update_machine;

pub use update_machine::{apply, installable, Step, UpdateTransition};
