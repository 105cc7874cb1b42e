/// Erros de framing do protocolo RESP.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// O buffer ainda não contém um comando completo.
    #[error("incomplete frame")]
    Incomplete,
    #[error("expected '{expected}', got {found:#x}")]
    InvalidFrameType { expected: char, found: u8 },
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
    #[error("invalid bulk length")]
    InvalidBulkLength(i64),
    #[error("invalid multibulk length")]
    InvalidMultibulkLength(i64),
    #[error("bulk exceeds maximum size ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("missing CRLF after bulk payload")]
    MissingTerminator,
}

/// Erros da engine de dados.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("server shutting down")]
    Shutdown,
    #[error("query buffer limit exceeded ({0} bytes)")]
    QueryBufferFull(usize),
    #[error("output buffer full")]
    OutboxFull,
}

/// Erros de validação de comandos (aridade, sintaxe, argumentos numéricos).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("wrong number of arguments for '{}' command", .0.to_lowercase())]
    WrongArity(String),
    #[error("syntax error")]
    Syntax,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("{0}")]
    OutOfRange(String),
}

/// Erro top-level do TideKV.
#[derive(Debug, thiserror::Error)]
pub enum TideError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl TideError {
    /// Texto da resposta de erro enviada ao cliente, sem o prefixo `-`.
    pub fn reply_message(&self) -> String {
        format!("ERR {self}")
    }
}

// Conversão implícita de io::Error → TideError (via ConnectionError)
impl From<std::io::Error> for TideError {
    fn from(e: std::io::Error) -> Self {
        TideError::Connection(ConnectionError::Io(e))
    }
}
