//! Purpose: Loopback RESP server backed by `MemoryStore` for integration tests.
//! Exports: `StoreServer`, `ServerMode`.
//! Role: Stand-in for a real sorted-set store so remote paths run over real TCP.
//! Invariants: Binds 127.0.0.1 on an ephemeral port; each connection gets its own thread.
//! Invariants: SELECT/AUTH/PING are answered here; everything else goes to the backend.
#![allow(dead_code)]

use bytes::{Buf, BytesMut};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use zsetview::api::{MemoryStore, Reply};
use zsetview::core::resp::{decode_reply, encode_reply};

pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerMode {
    Normal,
    /// Drops the last element of every ZRANGE reply.
    TruncateRanges,
    /// Closes the connection instead of answering ZRANGE.
    HangUpOnRange,
}

pub struct StoreServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    password: Option<String>,
}

impl StoreServer {
    pub fn start() -> TestResult<Self> {
        Self::start_with(ServerMode::Normal, None)
    }

    pub fn start_with(mode: ServerMode, password: Option<&str>) -> TestResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let store = Arc::new(MemoryStore::new());
        let password = password.map(str::to_string);

        let backend = Arc::clone(&store);
        let expected = password.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let backend = Arc::clone(&backend);
                let expected = expected.clone();
                thread::spawn(move || serve_connection(stream, &backend, mode, expected));
            }
        });

        Ok(Self {
            addr,
            store,
            password,
        })
    }

    pub fn url(&self, db: u32) -> String {
        match &self.password {
            Some(password) => format!("redis://:{password}@{}/{db}", self.addr),
            None => format!("redis://{}/{db}", self.addr),
        }
    }
}

fn serve_connection(
    mut stream: TcpStream,
    store: &MemoryStore,
    mode: ServerMode,
    password: Option<String>,
) {
    let mut buffer = BytesMut::new();
    let mut chunk = [0u8; 4096];
    let mut db = 0u32;
    let mut authed = password.is_none();
    loop {
        while let Ok(Some((request, used))) = decode_reply(&buffer) {
            buffer.advance(used);
            let Reply::Array(items) = request else { return };
            let args: Vec<Vec<u8>> = items
                .into_iter()
                .filter_map(|item| match item {
                    Reply::Bulk(bytes) => Some(bytes),
                    _ => None,
                })
                .collect();
            let name = args
                .first()
                .map(|name| name.to_ascii_uppercase())
                .unwrap_or_default();

            let reply = match name.as_slice() {
                b"AUTH" => {
                    let given = args.last().map(|p| String::from_utf8_lossy(p).into_owned());
                    if given.is_some() && given == password {
                        authed = true;
                        Reply::Simple("OK".to_string())
                    } else {
                        Reply::Error("WRONGPASS invalid username-password pair".to_string())
                    }
                }
                _ if !authed => Reply::Error("NOAUTH Authentication required.".to_string()),
                b"PING" => Reply::Simple("PONG".to_string()),
                b"SELECT" => {
                    let parsed = args
                        .get(1)
                        .and_then(|raw| std::str::from_utf8(raw).ok())
                        .and_then(|raw| raw.parse().ok());
                    match parsed {
                        Some(index) => {
                            db = index;
                            Reply::Simple("OK".to_string())
                        }
                        None => Reply::Error("ERR DB index is out of range".to_string()),
                    }
                }
                b"ZRANGE" if mode == ServerMode::HangUpOnRange => return,
                b"ZRANGE" if mode == ServerMode::TruncateRanges => {
                    match store.execute_args(db, &args) {
                        Reply::Array(mut values) => {
                            values.pop();
                            Reply::Array(values)
                        }
                        other => other,
                    }
                }
                _ => store.execute_args(db, &args),
            };

            let mut out = BytesMut::new();
            encode_reply(&reply, &mut out);
            if stream.write_all(&out).is_err() {
                return;
            }
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    }
}
