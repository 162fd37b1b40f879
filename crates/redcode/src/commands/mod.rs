//! Command dispatch: bridges CLI args -> core store/controller -> output.

pub mod acks;
pub mod alerts;
pub mod config_cmd;
pub mod drill;
pub mod raise;
pub mod resolve;
pub mod sounds;
pub mod util;
pub mod watch;

use redcode_core::RemoteStore;

use crate::cli::{Command, GlobalOpts};
use crate::config::Config;
use crate::error::CliError;

/// Dispatch a store-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    store: &RemoteStore,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, store, config, global).await,
        Command::Raise(args) => raise::handle(args, store, config, global).await,
        Command::Resolve(args) => resolve::handle(args, store, global).await,
        Command::Alerts(args) => alerts::handle(args, store, global).await,
        Command::Acks(args) => acks::handle(args, store, global).await,
        // Handled before a store is built
        Command::Drill(_) | Command::Sounds | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command does not use the store".into()))
        }
    }
}
