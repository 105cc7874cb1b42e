#![forbid(unsafe_code)]

mod blocking;
mod db;
mod entry;

pub use blocking::{Coordinator, PopOrBlock, Wakeup};
pub use db::Db;
