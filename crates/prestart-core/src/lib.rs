//! # prestart-core
//!
//! Shared vocabulary for the prestart workspace: the error type, the scalar
//! [`Value`] stored in every settings layer, and the truthy-flag parser.

pub mod error;
pub mod value;

pub use error::{PrestartError, Result};
pub use value::{Value, parse_flag};
