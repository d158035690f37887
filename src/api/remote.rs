//! Purpose: Blocking RESP2-over-TCP client for a remote sorted-set store.
//! Exports: `RemoteStore`, `ConnectionConfig`.
//! Role: Production `StoreClient`; one connection, commands issued one at a time.
//! Invariants: Store URLs use the `redis://[user[:password]@]host[:port][/db]` form.
//! Invariants: Transport failures surface as `ErrorKind::Remote`; the failed command is not retried.
//! Invariants: A broken connection is dropped and reopened on the next command.
#![allow(clippy::result_large_err)]

use super::store::{ApiResult, Command, StoreClient, describe};
use crate::core::error::{Error, ErrorKind};
use crate::core::resp::{Reply, ReplyDecoder, encode_command};
use bytes::{Buf, BytesMut};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_PORT: u16 = 6379;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 16 * 1024;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            db: 0,
            username: None,
            password: None,
            connect_timeout: DEFAULT_TIMEOUT,
            io_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_url(raw: &str) -> ApiResult<Self> {
        let url = Url::parse(raw).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid store url")
                .with_hint("Use a URL like redis://127.0.0.1:6379/0.")
                .with_source(err)
        })?;
        if url.scheme() != "redis" {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("store url must use the redis scheme")
                .with_hint("Use a URL like redis://127.0.0.1:6379/0."));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("store url is missing a host"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let mut config = Self::new(host, url.port().unwrap_or(DEFAULT_PORT));
        config.db = parse_db_path(url.path())?;
        if !url.username().is_empty() {
            config.username = Some(url.username().to_string());
        }
        config.password = url.password().map(str::to_string);
        if url.query().is_some() || url.fragment().is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("store url must not include a query or fragment"));
        }
        Ok(config)
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

pub struct RemoteStore {
    config: ConnectionConfig,
    conn: Mutex<Option<Connection>>,
}

struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    decoder: ReplyDecoder,
    selected_db: u32,
    broken: bool,
}

impl RemoteStore {
    /// Opens the connection eagerly so that bad addresses fail here, not on first use.
    pub fn connect(config: ConnectionConfig) -> ApiResult<Self> {
        let conn = Connection::open(&config)?;
        Ok(Self {
            config,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn with_connection<R>(
        &self,
        run: impl FnOnce(&mut Connection) -> ApiResult<R>,
    ) -> ApiResult<R> {
        let mut guard = self.lock();
        if guard.is_none() {
            debug!(address = %self.config.address(), "reconnecting to store");
            *guard = Some(Connection::open(&self.config)?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(Error::new(ErrorKind::Internal).with_message("connection slot is empty"));
        };
        let result = run(conn);
        if conn.broken {
            warn!(address = %self.config.address(), "dropping broken store connection");
            *guard = None;
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl StoreClient for RemoteStore {
    fn execute(&self, db: u32, command: &Command<'_>) -> ApiResult<Reply> {
        debug!(db, command = %describe(command), "store command");
        self.with_connection(|conn| {
            conn.select(db)?;
            conn.call(&command.to_args())
        })
        .map_err(|err| err.with_key(command.key()))
    }
}

impl Connection {
    fn open(config: &ConnectionConfig) -> ApiResult<Self> {
        let address = config.address();
        let addrs = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|err| connection_error(&address, "failed to resolve store address", err))?;

        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(connected) => {
                    stream = Some(connected);
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }
        let stream = match (stream, last_err) {
            (Some(stream), _) => stream,
            (None, Some(err)) => {
                return Err(connection_error(&address, "failed to connect to store", err));
            }
            (None, None) => {
                return Err(Error::new(ErrorKind::Remote)
                    .with_message(format!("store address {address} resolved to nothing")));
            }
        };

        let configure = |stream: &TcpStream| -> std::io::Result<()> {
            stream.set_read_timeout(Some(config.io_timeout))?;
            stream.set_write_timeout(Some(config.io_timeout))?;
            stream.set_nodelay(true)
        };
        configure(&stream)
            .map_err(|err| connection_error(&address, "failed to configure store socket", err))?;

        let mut conn = Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            decoder: ReplyDecoder::new(),
            selected_db: 0,
            broken: false,
        };
        if let Some(password) = &config.password {
            conn.authenticate(config.username.as_deref(), password)?;
        }
        conn.select(config.db)?;
        debug!(address = %address, db = config.db, "connected to store");
        Ok(conn)
    }

    fn authenticate(&mut self, username: Option<&str>, password: &str) -> ApiResult<()> {
        let mut args = vec![b"AUTH".to_vec()];
        if let Some(username) = username {
            args.push(username.as_bytes().to_vec());
        }
        args.push(password.as_bytes().to_vec());
        match self.call(&args)? {
            Reply::Simple(_) => Ok(()),
            Reply::Error(message) => Err(Error::new(ErrorKind::Remote)
                .with_message(message)
                .with_hint("Check the credentials in the store url.")),
            other => Err(Error::new(ErrorKind::Remote)
                .with_message(format!("unexpected {} reply to AUTH", other.kind_name()))),
        }
    }

    fn select(&mut self, db: u32) -> ApiResult<()> {
        if self.selected_db == db {
            return Ok(());
        }
        let args = [b"SELECT".to_vec(), db.to_string().into_bytes()];
        match self.call(&args)? {
            Reply::Simple(_) => {
                self.selected_db = db;
                Ok(())
            }
            Reply::Error(message) => Err(Error::new(ErrorKind::Remote).with_message(message)),
            other => Err(Error::new(ErrorKind::Remote)
                .with_message(format!("unexpected {} reply to SELECT", other.kind_name()))),
        }
    }

    fn call(&mut self, args: &[Vec<u8>]) -> ApiResult<Reply> {
        let mut request = BytesMut::new();
        encode_command(args, &mut request);
        if let Err(err) = self
            .stream
            .write_all(&request)
            .and_then(|()| self.stream.flush())
        {
            self.broken = true;
            return Err(io_error("failed to send command", err));
        }
        self.read_reply()
    }

    fn read_reply(&mut self) -> ApiResult<Reply> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.decoder.decode(&self.buffer) {
                Ok(Some((reply, used))) => {
                    self.buffer.advance(used);
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(err) => {
                    self.broken = true;
                    return Err(err);
                }
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.broken = true;
                    return Err(Error::new(ErrorKind::Remote)
                        .with_message("connection closed by store"));
                }
                Ok(read) => self.buffer.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.broken = true;
                    return Err(io_error("failed to read reply", err));
                }
            }
        }
    }
}

fn parse_db_path(path: &str) -> ApiResult<u32> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("store url path {path:?} is not a database index"))
            .with_hint("Use a numeric database index, e.g. redis://127.0.0.1:6379/2.")
    })
}

fn connection_error(address: &str, context: &str, err: std::io::Error) -> Error {
    Error::new(ErrorKind::Remote)
        .with_message(format!("connection error: {context} {address}: {err}"))
        .with_source(err)
}

fn io_error(context: &str, err: std::io::Error) -> Error {
    Error::new(ErrorKind::Remote)
        .with_message(format!("connection error: {context}: {err}"))
        .with_source(err)
}
