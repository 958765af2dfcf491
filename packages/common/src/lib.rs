//! Collaborators shared by the editor and the CLI: the file storage seam
//! and its error type.

pub mod error;
pub mod filesystem;

pub use error::*;
pub use filesystem::*;
