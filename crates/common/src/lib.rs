#![forbid(unsafe_code)]

mod error;

use std::fmt;

pub use error::*;

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const MAX_CONNECTIONS: usize = 1024;
pub const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024; // 4 KB
pub const MAX_FRAME_SIZE: usize = 512 * 1024 * 1024; // 512 MB, teto de um bulk
pub const MAX_MULTIBULK_LEN: usize = 1024 * 1024;
pub const EVENT_QUEUE_CAPACITY: usize = 1024;
pub const OUTBOX_CAPACITY: usize = 4096; // respostas pendentes por cliente
pub const MAX_QUERY_BUFFER: usize = 1024 * 1024 * 1024; // 1 GB de entrada não consumida

/// Identificador de uma conexão de cliente, atribuído no accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
