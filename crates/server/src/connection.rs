use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use tidekv_common::{ClientId, ConnectionError, INITIAL_BUFFER_CAPACITY, ProtocolError};
use tidekv_protocol::{Frame, parse_command};

/// Estado de bloqueio de um cliente.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Idle,
    /// Esperando um BLPOP na chave; comandos seguintes ficam no buffer.
    Blocked { key: Bytes },
}

/// Registro de um cliente conectado, do lado do event loop.
///
/// Guarda os bytes ainda não decodificados e a fila de saída que a task
/// de escrita drena para o socket. Ambos têm teto: `max_query_buffer`
/// bytes de entrada e a capacidade do canal `outbox`.
#[derive(Debug)]
pub struct Connection {
    id: ClientId,
    buffer: BytesMut,
    max_query_buffer: usize,
    state: State,
    outbox: mpsc::Sender<Bytes>,
}

impl Connection {
    pub fn new(id: ClientId, outbox: mpsc::Sender<Bytes>, max_query_buffer: usize) -> Self {
        Self {
            id,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_query_buffer,
            state: State::Idle,
            outbox,
        }
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.state, State::Blocked { .. })
    }

    /// Anexa bytes lidos do socket ao buffer de entrada.
    ///
    /// Falha se a entrada não consumida passaria do teto, o que acontece
    /// com um cliente bloqueado que continua enviando ou com um comando
    /// gigante.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let total = self.buffer.len() + data.len();
        if total > self.max_query_buffer {
            return Err(ConnectionError::QueryBufferFull(total));
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Próximo comando completo do buffer.
    ///
    /// Retorna `None` se falta dado. Em framing inválido o buffer inteiro é
    /// descartado, já que não há como ressincronizar no meio do stream.
    pub fn next_command(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        match parse_command(&self.buffer) {
            Ok(Some(req)) => {
                self.buffer.advance(req.len);
                Ok(Some(req.parts))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Enfileira a resposta para o socket sem esperar.
    ///
    /// Falha se o cliente não está lendo e a fila de saída encheu.
    pub fn write(&self, frame: &Frame) -> Result<(), ConnectionError> {
        match self.outbox.try_send(frame.to_bytes()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ConnectionError::OutboxFull),
            Err(TrySendError::Closed(_)) => {
                debug!(client = %self.id, "escrita descartada: conexão já encerrada");
                Ok(())
            }
        }
    }
}
