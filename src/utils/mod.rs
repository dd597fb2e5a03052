//! Small helpers shared by the library and the CLI.

pub mod audio;
pub mod playlist;
