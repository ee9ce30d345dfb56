pub mod notebook_repo;
pub mod startup_lock;
pub mod task_repo;

pub use notebook_repo::NotebookRepo;
pub use startup_lock::StartupLock;
pub use task_repo::TaskRepo;
