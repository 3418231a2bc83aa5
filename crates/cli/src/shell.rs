//! Interactive command handling: parse a line, run it, render the reply.

use crate::render;
use crate::tokenizer::tokenize;
use tierkv_kv::{Coordinator, CoordinatorError, Transport};

/// One parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: String },
    Put { key: String, value: String },
    Delete { key: String },
    Stat,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("unknown command")]
    UnknownCommand(String),
    #[error("{0}")]
    Usage(&'static str),
}

impl Command {
    /// Build a command from tokenized input. `tokens` must not be empty.
    pub fn parse(tokens: &[String]) -> Result<Self, UsageError> {
        let Some((name, args)) = tokens.split_first() else {
            return Err(UsageError::UnknownCommand(String::new()));
        };
        match name.as_str() {
            "get" => match args {
                [key] => Ok(Command::Get { key: key.clone() }),
                _ => Err(UsageError::Usage("usage: get <key>")),
            },
            "put" => match args {
                [key, value] => Ok(Command::Put {
                    key: key.clone(),
                    value: value.clone(),
                }),
                _ => Err(UsageError::Usage("usage: put <key> <value>")),
            },
            "del" => match args {
                [key] => Ok(Command::Delete { key: key.clone() }),
                _ => Err(UsageError::Usage("usage: del <key>")),
            },
            // Trailing arguments are ignored for these two.
            "stat" => Ok(Command::Stat),
            "exit" => Ok(Command::Exit),
            other => Err(UsageError::UnknownCommand(other.to_string())),
        }
    }
}

/// What the shell should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print this (nothing when empty) and read the next line.
    Output(String),
    Exit,
}

/// A session's command interpreter.
#[derive(Debug)]
pub struct Shell<T: Transport> {
    coordinator: Coordinator<T>,
}

impl<T: Transport> Shell<T> {
    pub fn new(coordinator: Coordinator<T>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Coordinator<T> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut Coordinator<T> {
        &mut self.coordinator
    }

    /// Run one input line.
    pub async fn execute(&self, line: &str) -> Reply {
        let tokens = tokenize(line.trim_matches(|c| c == ' ' || c == '\r' || c == '\n'));
        if tokens.is_empty() {
            return Reply::Output(String::new());
        }
        let command = match Command::parse(&tokens) {
            Ok(command) => command,
            Err(e) => return Reply::Output(e.to_string()),
        };
        tracing::debug!(?command, "executing");

        let output = match command {
            Command::Get { key } => match self.coordinator.get(&key).await {
                Ok(result) => result.value,
                Err(e) => render_error(&e),
            },
            Command::Put { key, value } => match self.coordinator.put(&key, value).await {
                Ok(_) => "ok".to_string(),
                Err(e) => render_error(&e),
            },
            Command::Delete { key } => match self.coordinator.delete(&key).await {
                Ok(_) => "ok".to_string(),
                Err(e) => render_error(&e),
            },
            Command::Stat => match self.coordinator.stat().await {
                Ok(report) => render::stat_table(&report),
                Err(e) => render_error(&e),
            },
            Command::Exit => return Reply::Exit,
        };
        Reply::Output(output)
    }
}

fn render_error(error: &CoordinatorError) -> String {
    match error {
        CoordinatorError::Conflict { siblings, .. } => {
            format!("error: {}\n{}", error, render::siblings(siblings))
        }
        other => format!("error: {}", other),
    }
}
