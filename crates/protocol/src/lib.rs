#![forbid(unsafe_code)]

mod codec;
mod command;
mod frame;
mod parse;

pub use codec::{Request, parse_command};
pub use command::Command;
pub use frame::Frame;
pub use parse::{Parse, parse_int};
