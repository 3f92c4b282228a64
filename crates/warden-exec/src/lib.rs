mod error;
pub use error::{ExecError, ExecResult};

pub mod proc;
pub use proc::{ProcInstance, ProcLauncher};

mod util;
pub use util::kill_graceful;

pub mod utils;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{ProcInstance, ProcLauncher};
}
