pub mod env;
pub mod identity;
pub mod limits;
