use std::collections::{BTreeSet, HashMap, VecDeque};

use bytes::Bytes;
use tokio::time::{Duration, Instant};
use tracing::debug;

use tidekv_common::{ClientId, StorageError};

use crate::Db;

/// Resultado de um pop bloqueante.
#[derive(Debug, Clone, PartialEq)]
pub enum PopOrBlock {
    /// A lista tinha elemento; nada foi enfileirado.
    Ready(Bytes),
    /// O cliente entrou na fila da chave e não recebe resposta agora.
    Blocked,
}

/// Um cliente desbloqueado por um push, com o elemento que recebeu.
#[derive(Debug, Clone, PartialEq)]
pub struct Wakeup {
    pub client: ClientId,
    pub key: Bytes,
    pub value: Bytes,
}

#[derive(Debug)]
struct Waiter {
    client: ClientId,
    seq: u64,
    deadline: Option<Instant>,
}

/// Item no BTreeSet de prazos: (instante, sequência, cliente).
/// Ordenado por instante; a sequência desempata na ordem de chegada.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
struct Deadline(Instant, u64, ClientId);

/// Registro FIFO de clientes bloqueados em BLPOP.
///
/// Cada cliente tem no máximo uma espera pendente. As filas são servidas
/// estritamente em ordem de chegada, e nunca sobra fila vazia no mapa.
#[derive(Debug, Default)]
pub struct Coordinator {
    queues: HashMap<Bytes, VecDeque<Waiter>>,
    blocked: HashMap<ClientId, Bytes>,
    deadlines: BTreeSet<Deadline>,
    next_seq: u64,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tenta `LPOP key 1`; se não houver elemento, enfileira o cliente.
    ///
    /// `timeout` ausente bloqueia até um push ou desconexão, assim como um
    /// timeout grande demais para virar um instante.
    pub fn try_pop_or_block(
        &mut self,
        db: &mut Db,
        key: Bytes,
        client: ClientId,
        timeout: Option<Duration>,
    ) -> Result<PopOrBlock, StorageError> {
        if let Some(value) = db.lpop(&key, 1)?.pop() {
            return Ok(PopOrBlock::Ready(value));
        }

        // uma espera por cliente
        self.abandon(client);

        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        if let Some(when) = deadline {
            self.deadlines.insert(Deadline(when, seq, client));
        }

        self.queues
            .entry(key.clone())
            .or_default()
            .push_back(Waiter {
                client,
                seq,
                deadline,
            });
        debug!(%client, key = %String::from_utf8_lossy(&key), seq, "cliente bloqueado");
        self.blocked.insert(client, key);

        Ok(PopOrBlock::Blocked)
    }

    /// Entrega elementos da lista aos clientes em espera, em ordem FIFO.
    ///
    /// Chamado após cada push bem-sucedido. Cada cliente recebe um elemento;
    /// para quando a fila ou a lista acabam. Um cliente só sai da fila
    /// quando há elemento para ele.
    pub fn notify_key_mutated(&mut self, db: &mut Db, key: &[u8]) -> Vec<Wakeup> {
        let mut woken = Vec::new();

        while self.queues.get(key).is_some_and(|q| !q.is_empty()) {
            let value = match db.lpop(key, 1) {
                Ok(mut popped) => match popped.pop() {
                    Some(value) => value,
                    None => break,
                },
                Err(_) => break,
            };

            let Some(waiter) = self.queues.get_mut(key).and_then(VecDeque::pop_front) else {
                break;
            };
            self.release(&waiter);
            debug!(client = %waiter.client, seq = waiter.seq, "cliente desbloqueado");
            woken.push(Wakeup {
                client: waiter.client,
                key: Bytes::copy_from_slice(key),
                value,
            });
        }

        self.drop_queue_if_empty(key);
        woken
    }

    /// Remove a espera do cliente, se houver. Chamado na desconexão.
    pub fn abandon(&mut self, client: ClientId) -> bool {
        let Some(key) = self.blocked.get(&client).cloned() else {
            return false;
        };

        if let Some(queue) = self.queues.get_mut(&key)
            && let Some(pos) = queue.iter().position(|w| w.client == client)
            && let Some(waiter) = queue.remove(pos)
        {
            self.release(&waiter);
        }
        self.blocked.remove(&client);
        self.drop_queue_if_empty(&key);

        debug!(%client, "espera abandonada");
        true
    }

    /// Prazo mais próximo entre todas as esperas com timeout.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|d| d.0)
    }

    /// Remove as esperas cujo prazo chegou e retorna seus clientes,
    /// na ordem dos prazos.
    pub fn expire(&mut self, now: Instant) -> Vec<ClientId> {
        let mut expired = Vec::new();
        while let Some(&Deadline(when, _, client)) = self.deadlines.first() {
            if when > now {
                break;
            }
            self.deadlines.pop_first();
            self.abandon(client);
            debug!(%client, "BLPOP expirou");
            expired.push(client);
        }
        expired
    }

    pub fn is_blocked(&self, client: ClientId) -> bool {
        self.blocked.contains_key(&client)
    }

    /// Chave na qual o cliente está bloqueado.
    pub fn blocked_on(&self, client: ClientId) -> Option<&Bytes> {
        self.blocked.get(&client)
    }

    /// Quantos clientes esperam na chave.
    pub fn waiting(&self, key: &[u8]) -> usize {
        self.queues.get(key).map_or(0, VecDeque::len)
    }

    // Limpa o índice de bloqueados e o prazo de um waiter já fora da fila.
    fn release(&mut self, waiter: &Waiter) {
        if let Some(when) = waiter.deadline {
            self.deadlines
                .remove(&Deadline(when, waiter.seq, waiter.client));
        }
        self.blocked.remove(&waiter.client);
    }

    fn drop_queue_if_empty(&mut self, key: &[u8]) {
        if self.queues.get(key).is_some_and(VecDeque::is_empty) {
            self.queues.remove(key);
        }
    }
}
