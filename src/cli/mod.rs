mod args;
mod inspect;

pub use args::{Cli, CliCommand, InspectCliArgs};
pub use inspect::handle_inspect_command;
