//! Interactive shell for tierkv: flags, tokenizer, command execution and
//! console rendering.

pub mod args;
pub mod render;
pub mod shell;
pub mod tokenizer;

pub use shell::{Command, Reply, Shell, UsageError};
pub use tokenizer::tokenize;
