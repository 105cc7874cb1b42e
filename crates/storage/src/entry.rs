use bytes::Bytes;
use std::collections::VecDeque;
use tokio::time::Instant;

/// Tipo do valor armazenado. O tipo de uma chave nunca muda por coerção.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Bytes),
    List(VecDeque<Bytes>),
}

impl Value {
    /// Nome do tipo como reportado por TYPE.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "string",
            Value::List(_) => "list",
        }
    }
}

/// Entrada no store: valor + expiração opcional.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    /// Expirada só quando `now` passou estritamente do prazo.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|t| now > t)
    }
}
