//! CLI command implementations.

mod doctor;
mod enrich;
mod init;
mod list;
mod process;
mod remove;
mod serve;

pub use doctor::run_doctor;
pub use enrich::run_enrich;
pub use init::run_init;
pub use list::run_list;
pub use process::run_process;
pub use remove::run_remove;
pub use serve::run_serve;
