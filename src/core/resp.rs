// RESP2 framing for store commands and replies.
use crate::core::error::{Error, ErrorKind};
use bytes::{BufMut, BytesMut};

const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_DEPTH: usize = 8;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Reply::Simple(_) => "simple string",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk string",
            Reply::Nil => "nil",
            Reply::Array(_) => "array",
        }
    }
}

/// Appends a command as an array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A], out: &mut BytesMut) {
    out.put_u8(b'*');
    out.put_slice(args.len().to_string().as_bytes());
    out.put_slice(b"\r\n");
    for arg in args {
        put_bulk(arg.as_ref(), out);
    }
}

pub fn encode_reply(reply: &Reply, out: &mut BytesMut) {
    match reply {
        Reply::Simple(text) => put_line(b'+', text.as_bytes(), out),
        Reply::Error(text) => put_line(b'-', text.as_bytes(), out),
        Reply::Integer(value) => put_line(b':', value.to_string().as_bytes(), out),
        Reply::Bulk(bytes) => put_bulk(bytes, out),
        Reply::Nil => out.put_slice(b"$-1\r\n"),
        Reply::Array(items) => {
            put_line(b'*', items.len().to_string().as_bytes(), out);
            for item in items {
                encode_reply(item, out);
            }
        }
    }
}

/// Decodes one reply from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the reply and the number of
/// bytes it occupied.
pub fn decode_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>, Error> {
    ReplyDecoder::new().decode(buf)
}

/// Incremental reply decoder that keeps its progress between reads.
///
/// Elements already decoded are not parsed again when more bytes arrive, so a large
/// array costs one pass over the wire bytes however it is split across reads.
/// The caller keeps the buffer anchored at the start of the pending reply until
/// `decode` returns it.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    consumed: usize,
    open: Vec<OpenArray>,
}

#[derive(Debug)]
struct OpenArray {
    remaining: usize,
    items: Vec<Reply>,
}

enum Element {
    Value(Reply),
    ArrayHeader(usize),
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes decoding `buf`; on error the decoder resets.
    pub fn decode(&mut self, buf: &[u8]) -> Result<Option<(Reply, usize)>, Error> {
        let result = self.resume(buf);
        if result.is_err() {
            self.reset();
        }
        result
    }

    pub fn reset(&mut self) {
        self.consumed = 0;
        self.open.clear();
    }

    fn resume(&mut self, buf: &[u8]) -> Result<Option<(Reply, usize)>, Error> {
        loop {
            let Some((element, next)) = decode_element(buf, self.consumed)? else {
                return Ok(None);
            };
            self.consumed = next;
            let mut value = match element {
                Element::Value(reply) => reply,
                Element::ArrayHeader(0) => Reply::Array(Vec::new()),
                Element::ArrayHeader(len) => {
                    if self.open.len() >= MAX_DEPTH {
                        return Err(protocol_error("reply nesting too deep"));
                    }
                    self.open.push(OpenArray {
                        remaining: len,
                        items: Vec::with_capacity(len.min(1024)),
                    });
                    continue;
                }
            };

            loop {
                let Some(parent) = self.open.last_mut() else {
                    let used = std::mem::take(&mut self.consumed);
                    return Ok(Some((value, used)));
                };
                parent.items.push(value);
                parent.remaining -= 1;
                if parent.remaining > 0 {
                    break;
                }
                let Some(done) = self.open.pop() else {
                    break;
                };
                value = Reply::Array(done.items);
            }
        }
    }
}

fn decode_element(buf: &[u8], pos: usize) -> Result<Option<(Element, usize)>, Error> {
    let Some(&tag) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    let value = match tag {
        b'+' => Reply::Simple(line_text(line)?),
        b'-' => Reply::Error(line_text(line)?),
        b':' => Reply::Integer(line_number(line)?),
        b'$' => {
            let len = line_number(line)?;
            if len == -1 {
                return Ok(Some((Element::Value(Reply::Nil), next)));
            }
            let len = checked_len(len)?;
            let end = next + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(protocol_error("bulk string is missing its terminator"));
            }
            return Ok(Some((Element::Value(Reply::Bulk(buf[next..end].to_vec())), end + 2)));
        }
        b'*' => {
            let len = line_number(line)?;
            if len == -1 {
                return Ok(Some((Element::Value(Reply::Nil), next)));
            }
            return Ok(Some((Element::ArrayHeader(checked_len(len)?), next)));
        }
        other => {
            return Err(protocol_error(format!(
                "unexpected reply type byte 0x{other:02x}"
            )));
        }
    };
    Ok(Some((Element::Value(value), next)))
}

fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let offset = rest.windows(2).position(|pair| pair == b"\r\n")?;
    Some((&rest[..offset], start + offset + 2))
}

fn line_text(line: &[u8]) -> Result<String, Error> {
    String::from_utf8(line.to_vec()).map_err(|err| {
        protocol_error("status line is not valid utf-8").with_source(err)
    })
}

fn line_number(line: &[u8]) -> Result<i64, Error> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| protocol_error("invalid integer in reply"))
}

fn checked_len(len: i64) -> Result<usize, Error> {
    if !(0..=MAX_BULK_LEN).contains(&len) {
        return Err(protocol_error(format!("invalid length {len} in reply")));
    }
    usize::try_from(len).map_err(|_| protocol_error("reply length overflows usize"))
}

fn put_line(tag: u8, body: &[u8], out: &mut BytesMut) {
    out.put_u8(tag);
    out.put_slice(body);
    out.put_slice(b"\r\n");
}

fn put_bulk(bytes: &[u8], out: &mut BytesMut) {
    put_line(b'$', bytes.len().to_string().as_bytes(), out);
    out.put_slice(bytes);
    out.put_slice(b"\r\n");
}

fn protocol_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Remote)
        .with_message(message)
        .with_hint("The server did not speak RESP2; check the store URL and port.")
}
