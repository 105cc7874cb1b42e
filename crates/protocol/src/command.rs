use bytes::Bytes;
use tidekv_common::CommandError;

use crate::Parse;

/// Enum com todos os comandos suportados.
///
/// Chaves e valores são bytes arbitrários; só o nome do comando e as
/// opções são interpretados como texto.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),
    Get(Bytes),
    Set {
        key: Bytes,
        value: Bytes,
        /// PX em milissegundos; zero ou ausente = sem expiração.
        expire_ms: Option<u64>,
    },
    RPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    LPush {
        key: Bytes,
        values: Vec<Bytes>,
    },
    LRange {
        key: Bytes,
        start: i64,
        stop: i64,
    },
    LLen(Bytes),
    LPop {
        key: Bytes,
        count: Option<usize>,
    },
    BLPop {
        key: Bytes,
        /// Segundos; zero bloqueia indefinidamente.
        timeout_secs: u64,
    },
    Exists(Vec<Bytes>),
    Del(Vec<Bytes>),
    Type(Bytes),
}

impl Command {
    /// Valida aridade e formato dos argumentos e monta o Command.
    ///
    /// A aridade é verificada antes de qualquer argumento numérico, então
    /// `LRANGE k x` reporta aridade e não inteiro inválido.
    pub fn from_parts(parts: Vec<Bytes>) -> Result<Command, CommandError> {
        let mut parse = Parse::new(parts)?;
        let cmd_name = parse.name().to_ascii_uppercase();

        let cmd = match cmd_name.as_str() {
            "PING" => {
                parse.arity(0..=1)?;
                Command::Ping(parse.next_optional())
            }
            "ECHO" => {
                parse.arity(1..=1)?;
                Command::Echo(parse.next_bytes()?)
            }
            "GET" => {
                parse.arity(1..=1)?;
                Command::Get(parse.next_bytes()?)
            }
            "SET" => parse_set(&mut parse)?,
            "RPUSH" => {
                parse.arity(2..)?;
                let key = parse.next_bytes()?;
                Command::RPush {
                    key,
                    values: parse.rest(),
                }
            }
            "LPUSH" => {
                parse.arity(2..)?;
                let key = parse.next_bytes()?;
                Command::LPush {
                    key,
                    values: parse.rest(),
                }
            }
            "LRANGE" => {
                parse.arity(3..=3)?;
                let key = parse.next_bytes()?;
                let start = parse.next_int()?;
                let stop = parse.next_int()?;
                Command::LRange { key, start, stop }
            }
            "LLEN" => {
                parse.arity(1..=1)?;
                Command::LLen(parse.next_bytes()?)
            }
            "LPOP" => {
                parse.arity(1..=2)?;
                let key = parse.next_bytes()?;
                let count = match parse.next_optional() {
                    Some(raw) => Some(non_negative(&raw, "value is out of range, must be positive")?),
                    None => None,
                };
                Command::LPop { key, count }
            }
            "BLPOP" => {
                parse.arity(2..=2)?;
                let key = parse.next_bytes()?;
                let raw = parse.next_bytes()?;
                let timeout_secs = non_negative(&raw, "timeout is negative")? as u64;
                Command::BLPop { key, timeout_secs }
            }
            "EXISTS" => {
                parse.arity(1..)?;
                Command::Exists(parse.rest())
            }
            "DEL" => {
                parse.arity(1..)?;
                Command::Del(parse.rest())
            }
            "TYPE" => {
                parse.arity(1..=1)?;
                Command::Type(parse.next_bytes()?)
            }
            _ => return Err(CommandError::Unknown(parse.name().to_string())),
        };

        parse.finish()?;
        Ok(cmd)
    }

    /// Nome canônico, usado em logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::RPush { .. } => "RPUSH",
            Command::LPush { .. } => "LPUSH",
            Command::LRange { .. } => "LRANGE",
            Command::LLen(_) => "LLEN",
            Command::LPop { .. } => "LPOP",
            Command::BLPop { .. } => "BLPOP",
            Command::Exists(_) => "EXISTS",
            Command::Del(_) => "DEL",
            Command::Type(_) => "TYPE",
        }
    }
}

// SET key value [PX ms]: só 3 ou 5 partes são válidas.
fn parse_set(parse: &mut Parse) -> Result<Command, CommandError> {
    parse.arity(2..)?;
    if parse.remaining() != 2 && parse.remaining() != 4 {
        return Err(CommandError::Syntax);
    }

    let key = parse.next_bytes()?;
    let value = parse.next_bytes()?;

    let expire_ms = match parse.next_optional() {
        None => None,
        Some(opt) if opt.eq_ignore_ascii_case(b"PX") => {
            let raw = parse.next_bytes()?;
            Some(non_negative(&raw, "value is out of range, must be positive")? as u64)
        }
        Some(_) => return Err(CommandError::Syntax),
    };

    Ok(Command::Set {
        key,
        value,
        expire_ms,
    })
}

fn non_negative(raw: &[u8], negative: &str) -> Result<usize, CommandError> {
    let n = crate::parse::parse_int(raw)?;
    usize::try_from(n).map_err(|_| CommandError::OutOfRange(negative.to_string()))
}
