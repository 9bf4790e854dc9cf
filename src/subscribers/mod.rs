//! # Subscribers: pluggable event handlers.
//!
//! The [`Subscribe`] trait is the extension point for reacting to engine
//! [`Event`](crate::Event)s: logging, metrics export, custom monitoring.
//! [`SubscriberSet`] fans events out to any number of subscribers without
//! ever blocking the publisher.
//!
//! A simple [`LogWriter`] is available behind the `logging` feature, useful
//! for demos and debugging.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
