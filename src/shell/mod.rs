mod builtins;
mod completion;
mod executor;
mod history;
mod parser;
mod readline;
#[allow(clippy::module_inception)]
mod shell;

pub use shell::Shell;
