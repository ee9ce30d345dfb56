//! The worker process: hosts the task manager, the cross-process
//! broadcast relay, and the production pipelines on one machine.

pub mod config;
