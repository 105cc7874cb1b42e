use bytes::Bytes;
use tokio::time::{Duration, Instant};
use tracing::debug;

use tidekv_common::{ClientId, StorageError};
use tidekv_protocol::{Command, Frame};
use tidekv_storage::{Coordinator, Db, PopOrBlock};

/// O que fazer com o cliente que enviou o comando.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Escrever a resposta agora.
    Reply(Frame),
    /// Não responder: o cliente ficou bloqueado na chave.
    Block { key: Bytes },
}

/// Resultado de um comando: a resposta do emissor e as respostas dos
/// clientes que o comando desbloqueou, na ordem em que foram atendidos.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: Outcome,
    pub woken: Vec<(ClientId, Frame)>,
}

impl Execution {
    fn reply(frame: Frame) -> Self {
        Self {
            outcome: Outcome::Reply(frame),
            woken: Vec::new(),
        }
    }
}

/// Executa comandos contra o store e o coordenador de bloqueio.
///
/// Dono exclusivo de ambos; só o event loop o chama.
#[derive(Debug, Default)]
pub struct Dispatcher {
    db: Db,
    coordinator: Coordinator,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valida as partes cruas de um comando e o executa.
    pub fn dispatch(&mut self, client: ClientId, parts: Vec<Bytes>) -> Execution {
        match Command::from_parts(parts) {
            Ok(cmd) => {
                debug!(%client, command = cmd.name(), "comando recebido");
                self.execute(client, cmd)
            }
            Err(e) => {
                debug!(%client, error = %e, "comando rejeitado");
                Execution::reply(Frame::error(e))
            }
        }
    }

    /// Executa um comando já validado.
    pub fn execute(&mut self, client: ClientId, cmd: Command) -> Execution {
        let db = &mut self.db;
        let frame = match cmd {
            Command::Ping(None) => Frame::Simple("PONG".into()),
            Command::Ping(Some(msg)) => Frame::Bulk(msg),
            Command::Echo(msg) => Frame::Bulk(msg),
            Command::Get(key) => match db.get(&key) {
                Some(value) => Frame::Bulk(value),
                None => Frame::Null,
            },
            Command::Set {
                key,
                value,
                expire_ms,
            } => {
                db.set(key, value, expire_ms);
                Frame::Simple("OK".into())
            }
            Command::RPush { key, values } => {
                let result = db.rpush(key.clone(), values);
                return self.after_push(&key, result);
            }
            Command::LPush { key, values } => {
                let result = db.lpush(key.clone(), values);
                return self.after_push(&key, result);
            }
            Command::LRange { key, start, stop } => {
                reply_with(db.lrange(&key, start, stop), Frame::bulk_array)
            }
            Command::LLen(key) => reply_with(db.llen(&key), |n| Frame::Integer(n as i64)),
            Command::LPop { key, count: None } => reply_with(db.lpop(&key, 1), |items| {
                items.into_iter().next().map_or(Frame::Null, Frame::Bulk)
            }),
            Command::LPop {
                key,
                count: Some(n),
            } => reply_with(db.lpop(&key, n), Frame::bulk_array),
            Command::BLPop { key, timeout_secs } => {
                let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
                match self
                    .coordinator
                    .try_pop_or_block(db, key.clone(), client, timeout)
                {
                    Ok(PopOrBlock::Ready(value)) => Frame::bulk_array(vec![key, value]),
                    Ok(PopOrBlock::Blocked) => {
                        return Execution {
                            outcome: Outcome::Block { key },
                            woken: Vec::new(),
                        };
                    }
                    Err(e) => Frame::error(e),
                }
            }
            Command::Exists(keys) => Frame::Integer(db.exists(&keys) as i64),
            Command::Del(keys) => Frame::Integer(db.del(&keys) as i64),
            Command::Type(key) => Frame::Simple(db.kind(&key).unwrap_or("none").into()),
        };
        Execution::reply(frame)
    }

    /// Desfaz a espera de um cliente que desconectou.
    pub fn abandon(&mut self, client: ClientId) -> bool {
        self.coordinator.abandon(client)
    }

    /// Prazo do próximo BLPOP a expirar.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.coordinator.next_deadline()
    }

    /// Clientes cujo BLPOP expirou até `now`; já não estão bloqueados.
    pub fn expire(&mut self, now: Instant) -> Vec<ClientId> {
        self.coordinator.expire(now)
    }

    pub fn is_blocked(&self, client: ClientId) -> bool {
        self.coordinator.is_blocked(client)
    }

    // A resposta do push sai antes de qualquer cliente acordado consumir a lista.
    fn after_push(&mut self, key: &[u8], result: Result<usize, StorageError>) -> Execution {
        let len = match result {
            Ok(len) => len,
            Err(e) => return Execution::reply(Frame::error(e)),
        };

        let woken = self
            .coordinator
            .notify_key_mutated(&mut self.db, key)
            .into_iter()
            .map(|w| (w.client, Frame::bulk_array(vec![w.key, w.value])))
            .collect();

        Execution {
            outcome: Outcome::Reply(Frame::Integer(len as i64)),
            woken,
        }
    }
}

fn reply_with<T>(result: Result<T, StorageError>, ok: impl FnOnce(T) -> Frame) -> Frame {
    match result {
        Ok(value) => ok(value),
        Err(e) => Frame::error(e),
    }
}
