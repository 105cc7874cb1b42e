use bytes::{BufMut, Bytes, BytesMut};
use tidekv_common::{ProtocolError, TideError};

use crate::codec::Reader;

/// Representação de um frame RESP2 de resposta.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Encoda o frame no buffer de saída em formato RESP2.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => put_line(dst, b'+', s.as_bytes()),
            Frame::Error(s) => put_line(dst, b'-', s.as_bytes()),
            Frame::Integer(n) => put_line(dst, b':', n.to_string().as_bytes()),
            Frame::Bulk(data) => {
                put_line(dst, b'$', data.len().to_string().as_bytes());
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(frames) => {
                put_line(dst, b'*', frames.len().to_string().as_bytes());
                for frame in frames {
                    frame.encode(dst);
                }
            }
        }
    }

    /// Encoda o frame em um buffer novo, pronto para ir ao socket.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodifica um frame de resposta do início de `src`.
    ///
    /// Retorna o frame e quantos bytes ele ocupa, ou `None` se ainda faltam
    /// dados. Usado por clientes e testes para ler o que o servidor escreve.
    pub fn decode(src: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
        let mut reader = Reader::new(src);
        match read_frame(&mut reader) {
            Ok(frame) => Ok(Some((frame, reader.position()))),
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Helper: cria um Frame::Bulk a partir de &str.
    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Helper: cria um Array de Bulk strings a partir de &[&str].
    pub fn array_from_strs(strs: &[&str]) -> Frame {
        Frame::Array(strs.iter().map(|s| Frame::bulk(s)).collect())
    }

    /// Helper: Array de Bulk a partir de valores já armazenados.
    pub fn bulk_array(items: Vec<Bytes>) -> Frame {
        Frame::Array(items.into_iter().map(Frame::Bulk).collect())
    }

    /// Resposta `-ERR <mensagem>` para qualquer erro não fatal.
    pub fn error(err: impl Into<TideError>) -> Frame {
        Frame::Error(err.into().reply_message())
    }
}

fn put_line(dst: &mut BytesMut, sigil: u8, content: &[u8]) {
    dst.put_u8(sigil);
    dst.put_slice(content);
    dst.put_slice(b"\r\n");
}

fn read_frame(reader: &mut Reader<'_>) -> Result<Frame, ProtocolError> {
    match reader.byte()? {
        b'+' => Ok(Frame::Simple(utf8_line(reader)?)),
        b'-' => Ok(Frame::Error(utf8_line(reader)?)),
        b':' => Ok(Frame::Integer(reader.decimal()?)),
        b'$' => {
            // Peek no comprimento para reconhecer o null bulk antes do payload.
            let mut lookahead = Reader::new(reader.rest());
            if lookahead.decimal()? == -1 {
                reader.advance(lookahead.position());
                return Ok(Frame::Null);
            }
            Ok(Frame::Bulk(reader.bulk_payload()?))
        }
        b'*' => {
            let count = reader.decimal()?;
            if count == -1 {
                return Ok(Frame::Null);
            }
            let count =
                usize::try_from(count).map_err(|_| ProtocolError::InvalidMultibulkLength(count))?;
            let mut frames = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                frames.push(read_frame(reader)?);
            }
            Ok(Frame::Array(frames))
        }
        found => Err(ProtocolError::InvalidFrameType {
            expected: '*',
            found,
        }),
    }
}

fn utf8_line(reader: &mut Reader<'_>) -> Result<String, ProtocolError> {
    let line = reader.line()?;
    String::from_utf8(line.to_vec()).map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidekv_common::{CommandError, StorageError};

    fn encoded(frame: &Frame) -> Vec<u8> {
        frame.to_bytes().to_vec()
    }

    #[test]
    fn encodes_every_reply_shape() {
        assert_eq!(encoded(&Frame::Simple("PONG".into())), b"+PONG\r\n");
        assert_eq!(encoded(&Frame::Integer(3)), b":3\r\n");
        assert_eq!(encoded(&Frame::Integer(-7)), b":-7\r\n");
        assert_eq!(encoded(&Frame::bulk("bar")), b"$3\r\nbar\r\n");
        assert_eq!(encoded(&Frame::bulk("")), b"$0\r\n\r\n");
        assert_eq!(encoded(&Frame::Null), b"$-1\r\n");
        assert_eq!(
            encoded(&Frame::array_from_strs(&["a", "bc"])),
            b"*2\r\n$1\r\na\r\n$2\r\nbc\r\n"
        );
        assert_eq!(encoded(&Frame::Array(vec![])), b"*0\r\n");
    }

    #[test]
    fn error_replies_carry_err_prefix() {
        assert_eq!(
            encoded(&Frame::error(StorageError::WrongType)),
            b"-ERR WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );
        assert_eq!(
            encoded(&Frame::error(CommandError::WrongArity("GET".into()))),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
    }

    #[test]
    fn decodes_reply_and_reports_length() {
        let data = b"*2\r\n$3\r\nkey\r\n$5\r\nvalue\r\n:1\r\n";
        let (frame, len) = Frame::decode(data).unwrap().unwrap();
        assert_eq!(frame, Frame::array_from_strs(&["key", "value"]));
        assert_eq!(len, data.len() - 4);

        let (next, _) = Frame::decode(&data[len..]).unwrap().unwrap();
        assert_eq!(next, Frame::Integer(1));
    }

    #[test]
    fn decodes_null_and_errors() {
        assert_eq!(
            Frame::decode(b"$-1\r\n").unwrap(),
            Some((Frame::Null, 5))
        );
        assert_eq!(
            Frame::decode(b"-ERR syntax error\r\n").unwrap(),
            Some((Frame::Error("ERR syntax error".into()), 19))
        );
    }

    #[test]
    fn incomplete_reply() {
        assert_eq!(Frame::decode(b"+OK\r"), Ok(None));
        assert_eq!(Frame::decode(b"$5\r\nhel"), Ok(None));
        assert_eq!(Frame::decode(b"*2\r\n$1\r\na\r\n"), Ok(None));
    }

    #[test]
    fn invalid_reply_type() {
        assert!(matches!(
            Frame::decode(b"?invalid\r\n"),
            Err(ProtocolError::InvalidFrameType { found: b'?', .. })
        ));
    }
}
