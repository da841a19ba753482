//! Archive decoding into a directory tree.

pub mod path;
pub mod tar;

pub use self::tar::TarExtractor;
