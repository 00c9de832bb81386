//! Channel adapter contract, the outbound router, and the terminal channel.

mod channel;
mod cli;
mod manager;
mod split;

pub use channel::{Channel, ChannelError};
pub use cli::CliChannel;
pub use manager::ChannelManager;
pub use split::split_message;
