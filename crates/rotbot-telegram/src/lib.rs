//! Telegram channel adapter — long polling in, live-edited streaming out.

mod adapter;

pub use adapter::TelegramChannel;
