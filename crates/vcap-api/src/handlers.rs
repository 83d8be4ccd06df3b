//! Request handlers.

pub mod captions;
pub mod health;

pub use captions::*;
pub use health::*;
