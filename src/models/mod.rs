pub mod checkpoint;
pub mod import_job;
pub mod job_run;
pub mod play;
pub mod token_vault;
pub mod track;
pub mod user;

pub use checkpoint::*;
pub use import_job::*;
pub use job_run::*;
pub use play::*;
pub use token_vault::*;
pub use track::*;
pub use user::*;
