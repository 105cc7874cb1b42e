use bytes::Bytes;
use tidekv_common::{MAX_FRAME_SIZE, MAX_MULTIBULK_LEN, ProtocolError};

/// Linhas numéricas maiores que isso sem CRLF são lixo, não dados parciais.
const MAX_DECIMAL_LINE: usize = 32;

/// Um comando decodificado do buffer de entrada.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Nome do comando seguido dos argumentos, na ordem recebida.
    pub parts: Vec<Bytes>,
    /// Quantos bytes do buffer o comando ocupou.
    pub len: usize,
}

/// Verifica se um comando completo está no buffer sem alocar.
///
/// Retorna quantos bytes o comando ocupa, `Ok(None)` se falta dado, ou
/// erro se o framing é inválido.
pub fn check_command(src: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let mut reader = Reader::new(src);
    match reader.check_request() {
        Ok(()) => Ok(Some(reader.position())),
        Err(ProtocolError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decodifica um comando `*<N>\r\n` seguido de N bulk strings.
///
/// Retorna `Ok(None)` se o buffer ainda não contém um comando completo,
/// e erro se o framing é inválido. Os argumentos só são copiados depois
/// que `check_command` confirma o comando inteiro. Nunca consome nada
/// parcialmente: quem chama avança o buffer em `Request::len` bytes.
pub fn parse_command(src: &[u8]) -> Result<Option<Request>, ProtocolError> {
    let Some(len) = check_command(src)? else {
        return Ok(None);
    };

    let mut reader = Reader::new(&src[..len]);
    let parts = reader.request()?;
    Ok(Some(Request { parts, len }))
}

/// Leitor sequencial sobre um slice de bytes RESP.
pub(crate) struct Reader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.src[self.pos..]
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn check_request(&mut self) -> Result<(), ProtocolError> {
        let count = self.multibulk_len()?;
        for _ in 0..count {
            self.expect(b'$')?;
            self.bulk_slice()?;
        }
        Ok(())
    }

    fn request(&mut self) -> Result<Vec<Bytes>, ProtocolError> {
        let count = self.multibulk_len()?;
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            self.expect(b'$')?;
            parts.push(self.bulk_payload()?);
        }
        Ok(parts)
    }

    fn multibulk_len(&mut self) -> Result<usize, ProtocolError> {
        self.expect(b'*')?;
        let count = self.length(ProtocolError::InvalidMultibulkLength)?;
        if count > MAX_MULTIBULK_LEN {
            return Err(ProtocolError::InvalidMultibulkLength(count as i64));
        }
        Ok(count)
    }

    /// Lê `<len>\r\n<bytes>\r\n` (o `$` já foi consumido).
    pub(crate) fn bulk_payload(&mut self) -> Result<Bytes, ProtocolError> {
        self.bulk_slice().map(Bytes::copy_from_slice)
    }

    // Mesmo framing de `bulk_payload`, devolvendo só a fatia.
    fn bulk_slice(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.length(ProtocolError::InvalidBulkLength)?;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        let data = self.take(len)?;
        if self.take(2)? != b"\r\n" {
            return Err(ProtocolError::MissingTerminator);
        }
        Ok(data)
    }

    pub(crate) fn expect(&mut self, sigil: u8) -> Result<(), ProtocolError> {
        let found = self.byte()?;
        if found != sigil {
            return Err(ProtocolError::InvalidFrameType {
                expected: sigil as char,
                found,
            });
        }
        Ok(())
    }

    pub(crate) fn byte(&mut self) -> Result<u8, ProtocolError> {
        let b = *self.src.get(self.pos).ok_or(ProtocolError::Incomplete)?;
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn line(&mut self) -> Result<&'a [u8], ProtocolError> {
        let rest = &self.src[self.pos..];
        let end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or(ProtocolError::Incomplete)?;
        self.pos += end + 2;
        Ok(&rest[..end])
    }

    pub(crate) fn decimal(&mut self) -> Result<i64, ProtocolError> {
        let start = self.pos;
        let line = match self.line() {
            Ok(line) => line,
            Err(ProtocolError::Incomplete) if self.src.len() - start > MAX_DECIMAL_LINE => {
                let head = &self.src[start..start + MAX_DECIMAL_LINE];
                return Err(ProtocolError::InvalidInteger(
                    String::from_utf8_lossy(head).into_owned(),
                ));
            }
            Err(e) => return Err(e),
        };
        let s = std::str::from_utf8(line)
            .map_err(|_| ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))?;
        s.parse::<i64>()
            .map_err(|_| ProtocolError::InvalidInteger(s.to_string()))
    }

    /// Decimal não-negativo; `invalid` constrói o erro para valores negativos.
    fn length(&mut self, invalid: fn(i64) -> ProtocolError) -> Result<usize, ProtocolError> {
        let n = self.decimal()?;
        usize::try_from(n).map_err(|_| invalid(n))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.src.len() - self.pos < n {
            return Err(ProtocolError::Incomplete);
        }
        let out = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(strs: &[&str]) -> Vec<Bytes> {
        strs.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
    }

    #[test]
    fn parses_complete_command() {
        let src = b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n";
        let req = parse_command(src).unwrap().unwrap();
        assert_eq!(req.parts, parts(&["ECHO", "hello"]));
        assert_eq!(req.len, src.len());
    }

    #[test]
    fn reports_consumed_bytes_with_pipelined_input() {
        let src = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let req = parse_command(src).unwrap().unwrap();
        assert_eq!(req.len, 14);
        let second = parse_command(&src[req.len..]).unwrap().unwrap();
        assert_eq!(second.parts, parts(&["PING"]));
    }

    #[test]
    fn every_prefix_needs_more_data() {
        let src = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        for cut in 0..src.len() {
            assert_eq!(
                parse_command(&src[..cut]),
                Ok(None),
                "prefix of {cut} bytes"
            );
        }
        assert!(parse_command(src).unwrap().is_some());
    }

    #[test]
    fn empty_bulk_is_allowed() {
        let src = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$0\r\n\r\n";
        let req = parse_command(src).unwrap().unwrap();
        assert_eq!(req.parts[2], Bytes::new());
    }

    #[test]
    fn binary_payload_containing_crlf() {
        let src = b"*2\r\n$4\r\nECHO\r\n$4\r\na\r\nb\r\n";
        let req = parse_command(src).unwrap().unwrap();
        assert_eq!(req.parts[1], Bytes::from_static(b"a\r\nb"));
    }

    #[test]
    fn wrong_leading_sigil_is_malformed() {
        assert_eq!(
            parse_command(b"PING\r\n"),
            Err(ProtocolError::InvalidFrameType {
                expected: '*',
                found: b'P'
            })
        );
        assert!(matches!(
            parse_command(b"*1\r\n+PING\r\n"),
            Err(ProtocolError::InvalidFrameType { expected: '$', .. })
        ));
    }

    #[test]
    fn non_numeric_length_is_malformed() {
        assert!(matches!(
            parse_command(b"*x\r\n"),
            Err(ProtocolError::InvalidInteger(_))
        ));
        assert!(matches!(
            parse_command(b"*1\r\n$abc\r\nPING\r\n"),
            Err(ProtocolError::InvalidInteger(_))
        ));
    }

    #[test]
    fn negative_lengths_are_malformed() {
        assert_eq!(
            parse_command(b"*-1\r\n"),
            Err(ProtocolError::InvalidMultibulkLength(-1))
        );
        assert_eq!(
            parse_command(b"*1\r\n$-1\r\n"),
            Err(ProtocolError::InvalidBulkLength(-1))
        );
    }

    #[test]
    fn payload_longer_than_declared_is_malformed() {
        assert_eq!(
            parse_command(b"*1\r\n$2\r\nPING\r\n"),
            Err(ProtocolError::MissingTerminator)
        );
    }

    #[test]
    fn runaway_length_line_is_malformed() {
        let src = [b"*".as_slice(), [b'9'; 40].as_slice()].concat();
        assert!(matches!(
            parse_command(&src),
            Err(ProtocolError::InvalidInteger(_))
        ));
    }

    #[test]
    fn check_measures_without_decoding() {
        let src = b"*3\r\n$5\r\nRPUSH\r\n$1\r\nq\r\n$3\r\nabc\r\n";
        assert_eq!(check_command(src), Ok(Some(src.len())));
        assert_eq!(parse_command(src).unwrap().unwrap().len, src.len());
    }

    #[test]
    fn partial_multibulk_is_only_checked() {
        // argumentos completos antes do corte não viram Bytes
        let big = vec![b'x'; 64 * 1024];
        let mut src = b"*3\r\n$5\r\nRPUSH\r\n$65536\r\n".to_vec();
        src.extend_from_slice(&big);
        src.extend_from_slice(b"\r\n$65536\r\nxx");

        assert_eq!(check_command(&src), Ok(None));
        assert_eq!(parse_command(&src), Ok(None));
    }

    #[test]
    fn check_reports_malformed_framing() {
        assert_eq!(
            check_command(b"*1\r\n$2\r\nPING\r\n"),
            Err(ProtocolError::MissingTerminator)
        );
        assert_eq!(
            check_command(b"*-1\r\n"),
            Err(ProtocolError::InvalidMultibulkLength(-1))
        );
    }

    #[test]
    fn zero_element_command() {
        let req = parse_command(b"*0\r\n").unwrap().unwrap();
        assert!(req.parts.is_empty());
        assert_eq!(req.len, 4);
    }
}
