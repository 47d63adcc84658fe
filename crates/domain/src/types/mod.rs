//! Domain types and models

pub mod account;
pub mod calendar;
pub mod event;
pub mod sync;

pub use account::*;
pub use calendar::*;
pub use event::*;
pub use sync::*;
