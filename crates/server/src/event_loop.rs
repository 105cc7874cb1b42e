use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use tidekv_common::{ClientId, MAX_QUERY_BUFFER, TideError};
use tidekv_protocol::Frame;

use crate::connection::{Connection, State};
use crate::dispatcher::{Dispatcher, Outcome};

/// Notificações da camada de I/O para o event loop.
#[derive(Debug)]
pub enum Event {
    /// Conexão aceita; `outbox` leva as respostas até o socket.
    Connected {
        id: ClientId,
        outbox: mpsc::Sender<Bytes>,
    },
    /// Bytes lidos do socket.
    Readable { id: ClientId, data: Bytes },
    /// O peer fechou ou a leitura falhou.
    Closed { id: ClientId },
}

/// Loop single-threaded dono do store, do coordenador e do registro de
/// conexões.
///
/// Cada evento é tratado até o fim antes do próximo, então nenhum estado
/// aqui precisa de lock.
pub struct EventLoop {
    dispatcher: Dispatcher,
    connections: HashMap<ClientId, Connection>,
    events: mpsc::Receiver<Event>,
    max_query_buffer: usize,
}

impl EventLoop {
    pub fn new(events: mpsc::Receiver<Event>) -> Self {
        Self::with_max_query_buffer(events, MAX_QUERY_BUFFER)
    }

    /// Como `new`, com outro teto de entrada não consumida por cliente.
    pub fn with_max_query_buffer(events: mpsc::Receiver<Event>, max_query_buffer: usize) -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            connections: HashMap::new(),
            events,
            max_query_buffer,
        }
    }

    /// Processa eventos até o shutdown ou até a camada de I/O sumir.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let deadline = self.dispatcher.next_deadline();
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = wait_until(deadline) => self.handle_timeouts(Instant::now()),
                _ = shutdown.recv() => {
                    info!("event loop encerrando");
                    break;
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected { id, outbox } => {
                info!(client = %id, "conexão registrada");
                self.connections
                    .insert(id, Connection::new(id, outbox, self.max_query_buffer));
            }
            Event::Readable { id, data } => {
                let Some(conn) = self.connections.get_mut(&id) else {
                    return;
                };
                if let Err(e) = conn.feed(&data) {
                    warn!(client = %id, error = %e, "desconectando cliente");
                    self.disconnect(id);
                    return;
                }
                self.drain(VecDeque::from([id]));
            }
            Event::Closed { id } => self.disconnect(id),
        }
    }

    /// Responde null aos BLPOP cujo prazo venceu e retoma esses clientes.
    pub fn handle_timeouts(&mut self, now: Instant) {
        let expired = self.dispatcher.expire(now);
        let mut resumed = VecDeque::with_capacity(expired.len());
        for id in expired {
            self.reply(id, &Frame::Null);
            if let Some(conn) = self.connections.get_mut(&id) {
                conn.set_state(State::Idle);
                resumed.push_back(id);
            }
        }
        self.drain(resumed);
    }

    pub fn connection(&self, id: ClientId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // Executa os comandos no buffer de cada cliente da fila enquanto ele
    // não estiver bloqueado. Clientes acordados entram no fim da fila.
    fn drain(&mut self, mut pending: VecDeque<ClientId>) {
        while let Some(id) = pending.pop_front() {
            loop {
                let Some(conn) = self.connections.get_mut(&id) else {
                    break;
                };
                if conn.is_blocked() {
                    break;
                }

                let parts = match conn.next_command() {
                    Ok(Some(parts)) => parts,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(client = %id, error = %e, "erro de protocolo");
                        self.reply(id, &Frame::error(TideError::from(e)));
                        break;
                    }
                };

                let exec = self.dispatcher.dispatch(id, parts);
                match exec.outcome {
                    Outcome::Reply(frame) => self.reply(id, &frame),
                    Outcome::Block { key } => conn.set_state(State::Blocked { key }),
                }

                for (client, frame) in exec.woken {
                    self.reply(client, &frame);
                    if let Some(woken) = self.connections.get_mut(&client) {
                        woken.set_state(State::Idle);
                        pending.push_back(client);
                    }
                }
            }
        }
    }

    // Enfileira a resposta; quem não drena a própria saída é desconectado.
    fn reply(&mut self, id: ClientId, frame: &Frame) {
        let Some(conn) = self.connections.get(&id) else {
            return;
        };
        if let Err(e) = conn.write(frame) {
            warn!(client = %id, error = %e, "desconectando cliente");
            self.disconnect(id);
        }
    }

    // Soltar a Connection fecha o outbox, o que encerra as tasks de socket.
    fn disconnect(&mut self, id: ClientId) {
        if self.dispatcher.abandon(id) {
            debug!(client = %id, "espera cancelada na desconexão");
        }
        if self.connections.remove(&id).is_some() {
            info!(client = %id, "conexão encerrada");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(when) => sleep_until(when).await,
        None => std::future::pending().await,
    }
}
