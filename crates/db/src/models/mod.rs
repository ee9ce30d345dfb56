pub mod notebook;
pub mod status;
pub mod task;
