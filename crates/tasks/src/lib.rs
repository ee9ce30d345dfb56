//! Background task manager.
//!
//! Two distinct notions are kept apart on purpose:
//! - the durable task *record* (read/write by id from any process, via
//!   [`mosaic_db::repositories::TaskRepo`]),
//! - the transient in-process *handle* (cancellation flag, attached child
//!   process), which is never persisted.
//!
//! A [`TaskManager`] is constructed explicitly during worker startup and
//! shared by cloning; there is no implicit module-level singleton.

pub mod handle;
pub mod manager;
pub mod startup;

pub use handle::TaskHandle;
pub use manager::{TaskManager, TaskManagerError};
