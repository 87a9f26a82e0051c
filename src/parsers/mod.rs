pub mod common;
pub mod constraints;
pub mod go;

pub use constraints::BuildContext;
pub use go::GoParser;
