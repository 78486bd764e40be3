//! Change detection and fan-out.
//!
//! The [`poller::Poller`] watches catalog tables for rows newer than its
//! per-table watermark and hands each one, as a [`job::NotificationJob`], to
//! the [`dispatcher::Dispatcher`], which renders and sends it to every active
//! subscriber in turn.

pub mod cursor;
pub mod dispatcher;
pub mod job;
pub mod poller;
pub mod render;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use job::NotificationJob;
pub use poller::{Poller, PollerConfig, PollerHandle, TickOutcome};
pub use render::{CaptionStrategy, RenderedNotification, Renderer};

#[cfg(test)]
pub(crate) mod fakes;
