mod build;

pub use build::{cmd_build, exit_code_for};
