#![warn(clippy::pedantic)]
#![warn(missing_docs)]
//! Low-level dependency-tracking runtime backing `bloom`.
//!
//! This crate knows nothing about cached values, user closures, or cell kinds — only about
//! subscription bookkeeping ([`lifetime`], [`notify`]) and ambient dependency capture
//! ([`context`]).
//!
//! # Threading notes
//!
//! None of the functions in this crate produce *any* memory barriers beyond what the
//! underlying `parking_lot` locks already provide.

pub mod context;
pub mod lifetime;
pub mod notify;

pub use context::Context;
pub use lifetime::Lifetime;
pub use notify::{Changeable, ClosureNotifiable, Notifiable, NotificationSet};
