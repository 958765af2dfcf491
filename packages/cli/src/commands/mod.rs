pub mod init;
pub mod replay;
pub mod validate;

pub use init::{init, InitArgs};
pub use replay::{replay, ReplayArgs};
pub use validate::{validate, ValidateArgs};
