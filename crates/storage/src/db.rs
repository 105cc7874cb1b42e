use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tokio::time::{Duration, Instant};
use tracing::debug;

use tidekv_common::StorageError;

use crate::entry::{Entry, Value};

/// Banco de dados in-memory.
///
/// Pertence a uma única task (o event loop), então não há lock interno:
/// toda operação recebe `&mut self` e roda até o fim. A expiração é
/// verificada de forma preguiçosa no início de cada operação que toca
/// a chave; não existe varredura em background.
#[derive(Debug, Default)]
pub struct Db {
    data: HashMap<Bytes, Entry>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Scalar operations ---

    /// Valor escalar da chave. Listas e chaves expiradas retornam `None`.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        match &self.live(key)?.value {
            Value::Scalar(data) => Some(data.clone()),
            Value::List(_) => None,
        }
    }

    /// Substitui qualquer valor anterior, de qualquer tipo.
    ///
    /// `expire_ms` zero ou ausente remove a expiração.
    pub fn set(&mut self, key: Bytes, value: Bytes, expire_ms: Option<u64>) {
        let expires_at = expire_ms
            .filter(|&ms| ms > 0)
            .and_then(|ms| Instant::now().checked_add(Duration::from_millis(ms)));
        self.data
            .insert(key, Entry::new(Value::Scalar(value), expires_at));
    }

    // --- Keyspace ---

    /// Conta as chaves vivas; chaves repetidas contam uma vez por ocorrência.
    pub fn exists(&mut self, keys: &[Bytes]) -> usize {
        keys.iter().filter(|key| self.live(key).is_some()).count()
    }

    pub fn del(&mut self, keys: &[Bytes]) -> usize {
        let mut count = 0;
        for key in keys {
            if self.live(key).is_some() {
                self.data.remove(key);
                count += 1;
            }
        }
        count
    }

    /// Nome do tipo guardado na chave, ou `None` se ela não existe.
    pub fn kind(&mut self, key: &[u8]) -> Option<&'static str> {
        self.live(key).map(|entry| entry.value.type_name())
    }

    // --- List operations ---

    /// Anexa `values` no fim, na ordem dada. Retorna o novo tamanho.
    pub fn rpush(&mut self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StorageError> {
        let list = self.list_for_push(key)?;
        list.extend(values);
        Ok(list.len())
    }

    /// Insere cada valor na cabeça, um de cada vez: o último fica na frente.
    pub fn lpush(&mut self, key: Bytes, values: Vec<Bytes>) -> Result<usize, StorageError> {
        let list = self.list_for_push(key)?;
        for v in values {
            list.push_front(v);
        }
        Ok(list.len())
    }

    /// Fatia inclusiva `[start, stop]` com índices negativos contados do fim.
    pub fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, StorageError> {
        let Some(list) = self.list(key)? else {
            return Ok(vec![]);
        };

        let len = list.len() as i64;
        let start = if start < 0 { len + start } else { start }.max(0);
        let stop = if stop < 0 { len + stop } else { stop };
        if stop < 0 || start >= len || start > stop {
            return Ok(vec![]);
        }
        let stop = stop.min(len - 1);

        Ok(list
            .range(start as usize..=stop as usize)
            .cloned()
            .collect())
    }

    pub fn llen(&mut self, key: &[u8]) -> Result<usize, StorageError> {
        Ok(self.list(key)?.map_or(0, |list| list.len()))
    }

    /// Remove até `count` elementos da cabeça, na ordem cabeça→cauda.
    ///
    /// Uma lista esvaziada é removida do keyspace.
    pub fn lpop(&mut self, key: &[u8], count: usize) -> Result<Vec<Bytes>, StorageError> {
        let Some(list) = self.list(key)? else {
            return Ok(vec![]);
        };

        let n = count.min(list.len());
        let popped: Vec<Bytes> = list.drain(..n).collect();

        if list.is_empty() {
            self.data.remove(key);
            debug!(key = %String::from_utf8_lossy(key), "lista esvaziada removida");
        }
        Ok(popped)
    }

    /// Entrada viva da chave; uma entrada expirada é removida antes.
    fn live(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.data.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.data.remove(key);
            debug!(key = %String::from_utf8_lossy(key), "chave expirada removida");
            return None;
        }
        self.data.get_mut(key)
    }

    fn list(&mut self, key: &[u8]) -> Result<Option<&mut VecDeque<Bytes>>, StorageError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(Some(list)),
            Some(_) => Err(StorageError::WrongType),
        }
    }

    fn list_for_push(&mut self, key: Bytes) -> Result<&mut VecDeque<Bytes>, StorageError> {
        self.live(&key);
        let entry = self
            .data
            .entry(key)
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new()), None));
        match &mut entry.value {
            Value::List(list) => Ok(list),
            Value::Scalar(_) => Err(StorageError::WrongType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn bs(strs: &[&str]) -> Vec<Bytes> {
        strs.iter().map(|s| b(s)).collect()
    }

    #[test]
    fn get_set_basic() {
        let mut db = Db::new();
        db.set(b("key"), b("value"), None);
        assert_eq!(db.get(b"key"), Some(b("value")));
    }

    #[test]
    fn get_nonexistent() {
        let mut db = Db::new();
        assert_eq!(db.get(b"missing"), None);
    }

    #[test]
    fn set_empty_value() {
        let mut db = Db::new();
        db.set(b(""), b(""), None);
        assert_eq!(db.get(b""), Some(Bytes::new()));
    }

    #[test]
    fn set_replaces_list() {
        let mut db = Db::new();
        db.rpush(b("k"), bs(&["a"])).unwrap();
        db.set(b("k"), b("v"), None);
        assert_eq!(db.get(b"k"), Some(b("v")));
        assert_eq!(db.kind(b"k"), Some("string"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_with_expiry() {
        let mut db = Db::new();
        db.set(b("foo"), b("bar"), Some(50));
        assert_eq!(db.get(b"foo"), Some(b("bar")));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(db.get(b"foo"), Some(b("bar")));

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(db.get(b"foo"), None);
        assert_eq!(db.exists(&[b("foo")]), 0);
        assert_eq!(db.llen(b"foo"), Ok(0));
        assert!(db.data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_px_means_no_expiry() {
        let mut db = Db::new();
        db.set(b("k"), b("v"), Some(0));
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(db.get(b"k"), Some(b("v")));
    }

    #[tokio::test(start_paused = true)]
    async fn set_without_px_clears_expiry() {
        let mut db = Db::new();
        db.set(b("k"), b("v1"), Some(10));
        db.set(b("k"), b("v2"), None);
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(db.get(b"k"), Some(b("v2")));
    }

    #[tokio::test(start_paused = true)]
    async fn push_on_expired_scalar_creates_list() {
        let mut db = Db::new();
        db.set(b("k"), b("v"), Some(5));
        tokio::time::advance(Duration::from_millis(6)).await;
        assert_eq!(db.rpush(b("k"), bs(&["a"])), Ok(1));
        assert_eq!(db.kind(b"k"), Some("list"));
    }

    #[test]
    fn del_keys() {
        let mut db = Db::new();
        db.set(b("a"), b("1"), None);
        db.rpush(b("b"), bs(&["x"])).unwrap();

        assert_eq!(db.del(&bs(&["a", "b", "c"])), 2);
        assert_eq!(db.get(b"a"), None);
        assert_eq!(db.llen(b"b"), Ok(0));
    }

    #[test]
    fn exists_keys() {
        let mut db = Db::new();
        db.set(b("a"), b("1"), None);
        assert_eq!(db.exists(&bs(&["a", "b"])), 1);
        assert_eq!(db.exists(&bs(&["a", "a"])), 2);
    }

    #[test]
    fn kind_reports_type() {
        let mut db = Db::new();
        db.set(b("s"), b("1"), None);
        db.lpush(b("l"), bs(&["x"])).unwrap();
        assert_eq!(db.kind(b"s"), Some("string"));
        assert_eq!(db.kind(b"l"), Some("list"));
        assert_eq!(db.kind(b"none"), None);
    }

    #[test]
    fn rpush_keeps_order() {
        let mut db = Db::new();
        assert_eq!(db.rpush(b("mylist"), bs(&["a", "b", "c"])), Ok(3));
        assert_eq!(db.lrange(b"mylist", 0, -1).unwrap(), bs(&["a", "b", "c"]));
    }

    #[test]
    fn lpush_last_value_ends_in_front() {
        let mut db = Db::new();
        assert_eq!(db.lpush(b("l"), bs(&["a", "b", "c"])), Ok(3));
        assert_eq!(db.lrange(b"l", 0, -1).unwrap(), bs(&["c", "b", "a"]));

        assert_eq!(db.lpush(b("l"), bs(&["d"])), Ok(4));
        assert_eq!(db.rpush(b("l"), bs(&["e"])), Ok(5));
        assert_eq!(
            db.lrange(b"l", 0, -1).unwrap(),
            bs(&["d", "c", "b", "a", "e"])
        );
    }

    #[test]
    fn list_scenario() {
        let mut db = Db::new();
        assert_eq!(db.rpush(b("mylist"), bs(&["a", "b", "c"])), Ok(3));
        assert_eq!(db.lpop(b"mylist", 2).unwrap(), bs(&["a", "b"]));
        assert_eq!(db.llen(b"mylist"), Ok(1));
    }

    #[test]
    fn lpop_more_than_available_drains_and_deletes() {
        let mut db = Db::new();
        db.rpush(b("l"), bs(&["a", "b"])).unwrap();
        assert_eq!(db.lpop(b"l", 5).unwrap(), bs(&["a", "b"]));
        assert_eq!(db.kind(b"l"), None);
        assert_eq!(db.llen(b"l"), Ok(0));
        assert_eq!(db.lpop(b"l", 1).unwrap(), Vec::<Bytes>::new());
    }

    #[test]
    fn lpop_zero_keeps_list() {
        let mut db = Db::new();
        db.rpush(b("l"), bs(&["a"])).unwrap();
        assert!(db.lpop(b"l", 0).unwrap().is_empty());
        assert_eq!(db.llen(b"l"), Ok(1));
    }

    #[test]
    fn lrange_negative_indices() {
        let mut db = Db::new();
        db.rpush(b("list"), bs(&["a", "b", "c", "d"])).unwrap();

        assert_eq!(db.lrange(b"list", -2, -1).unwrap(), bs(&["c", "d"]));
        assert_eq!(db.lrange(b"list", 0, -2).unwrap(), bs(&["a", "b", "c"]));
    }

    #[test]
    fn lrange_clamps_out_of_bounds() {
        let mut db = Db::new();
        db.rpush(b("list"), bs(&["a", "b", "c"])).unwrap();

        assert_eq!(db.lrange(b"list", -100, -1).unwrap(), bs(&["a", "b", "c"]));
        assert_eq!(db.lrange(b"list", 0, 100).unwrap(), bs(&["a", "b", "c"]));
        assert!(db.lrange(b"list", 5, 10).unwrap().is_empty());
        assert!(db.lrange(b"list", 3, 3).unwrap().is_empty());
        assert!(db.lrange(b"list", 2, 1).unwrap().is_empty());
        assert!(db.lrange(b"list", 0, -100).unwrap().is_empty());
        assert!(db.lrange(b"missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn wrong_type_does_not_mutate() {
        let mut db = Db::new();
        db.set(b("key"), b("value"), None);
        assert_eq!(db.rpush(b("key"), bs(&["a"])), Err(StorageError::WrongType));
        assert_eq!(db.lpush(b("key"), bs(&["a"])), Err(StorageError::WrongType));
        assert_eq!(db.lrange(b"key", 0, -1), Err(StorageError::WrongType));
        assert_eq!(db.llen(b"key"), Err(StorageError::WrongType));
        assert_eq!(db.lpop(b"key", 1), Err(StorageError::WrongType));
        assert_eq!(db.get(b"key"), Some(b("value")));
    }

    #[test]
    fn get_on_list_is_absent() {
        let mut db = Db::new();
        db.rpush(b("list"), bs(&["a"])).unwrap();
        assert_eq!(db.get(b"list"), None);
        assert_eq!(db.llen(b"list"), Ok(1));
    }
}
