use std::vec::IntoIter;

use bytes::Bytes;
use tidekv_common::CommandError;

/// Cursor sobre as partes de um comando para extrair argumentos em ordem.
///
/// O nome do comando é consumido na construção e reaproveitado nas
/// mensagens de aridade.
pub struct Parse {
    name: String,
    parts: IntoIter<Bytes>,
}

impl Parse {
    /// Cria um Parse a partir das partes cruas. Falha se não há nome.
    pub fn new(parts: Vec<Bytes>) -> Result<Parse, CommandError> {
        let mut parts = parts.into_iter();
        let name = parts.next().ok_or(CommandError::Empty)?;
        Ok(Parse {
            name: String::from_utf8_lossy(&name).into_owned(),
            parts,
        })
    }

    /// Nome do comando como veio do cliente.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quantidade de argumentos ainda não consumidos.
    pub fn remaining(&self) -> usize {
        self.parts.len()
    }

    /// Falha com erro de aridade se o total de argumentos não está em `range`.
    pub fn arity(&self, range: impl std::ops::RangeBounds<usize>) -> Result<(), CommandError> {
        if range.contains(&self.remaining()) {
            Ok(())
        } else {
            Err(self.wrong_arity())
        }
    }

    /// Retorna o próximo argumento como Bytes.
    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        match self.parts.next() {
            Some(part) => Ok(part),
            None => Err(self.wrong_arity()),
        }
    }

    /// Próximo argumento opcional.
    pub fn next_optional(&mut self) -> Option<Bytes> {
        self.parts.next()
    }

    /// Retorna o próximo argumento como i64.
    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        let part = self.next_bytes()?;
        parse_int(&part)
    }

    /// Consome o restante dos argumentos.
    pub fn rest(&mut self) -> Vec<Bytes> {
        self.parts.by_ref().collect()
    }

    /// Verifica se todos os argumentos foram consumidos.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.remaining() > 0 {
            Err(self.wrong_arity())
        } else {
            Ok(())
        }
    }

    fn wrong_arity(&self) -> CommandError {
        CommandError::WrongArity(self.name.clone())
    }
}

/// Converte um argumento em i64, aceitando sinal e nada além de dígitos.
pub fn parse_int(part: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(part)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotAnInteger)
}
