//! Client for Docs++.
//!
//! A [`Client`] holds one registered connection to the name server. READ,
//! STREAM and WRITE are resolved there to a storage server address and then
//! run over a fresh connection to that storage server.
//!
//! ```no_run
//! # async fn demo() -> Result<(), docs_client::ClientError> {
//! let mut client = docs_client::Client::connect("127.0.0.1:8080", "alice").await?;
//! client.create("notes.txt").await?;
//! let mut session = client.write("notes.txt", 0).await?;
//! session.edit(0, "Hello").await?;
//! session.edit(1, "world.").await?;
//! session.commit().await?;
//! println!("{}", client.read("notes.txt").await?);
//! # Ok(())
//! # }
//! ```

use docs_core::protocol::{
    Command, FrameError, Request, Response, Status, recv_response, send_request,
};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("{message} ({status})")]
    Status { status: Status, message: String },
    #[error("bad storage server address '{0}'")]
    BadAddress(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Status carried by a refused request, if that is what this is.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

fn check(resp: Response) -> ClientResult<String> {
    if resp.is_ok() {
        Ok(resp.data)
    } else {
        Err(ClientError::Status {
            status: resp.status,
            message: resp.data,
        })
    }
}

/// Sends one request and waits for its response.
async fn call(stream: &mut TcpStream, req: &Request) -> ClientResult<Response> {
    send_request(stream, req).await?;
    Ok(recv_response(stream).await?)
}

#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    username: String,
}

impl Client {
    /// Connects and registers as `username` (CLIENT_INIT).
    pub async fn connect(addr: &str, username: &str) -> ClientResult<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let resp = call(
            &mut stream,
            &Request::new(Command::ClientInit, username, ""),
        )
        .await?;
        let welcome = check(resp)?;
        debug!("{welcome}");
        Ok(Self {
            stream,
            username: username.to_string(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Sends any command to the name server and returns its raw response.
    pub async fn request(&mut self, command: Command, args: &str) -> ClientResult<Response> {
        call(
            &mut self.stream,
            &Request::new(command, self.username.as_str(), args),
        )
        .await
    }

    async fn expect_ok(&mut self, command: Command, args: &str) -> ClientResult<String> {
        check(self.request(command, args).await?)
    }

    pub async fn create(&mut self, name: &str) -> ClientResult<String> {
        self.expect_ok(Command::Create, name).await
    }

    pub async fn delete(&mut self, name: &str) -> ClientResult<String> {
        self.expect_ok(Command::Delete, name).await
    }

    pub async fn info(&mut self, name: &str) -> ClientResult<String> {
        self.expect_ok(Command::Info, name).await
    }

    pub async fn view(&mut self, all: bool, long: bool) -> ClientResult<String> {
        let mut flags = Vec::new();
        if all {
            flags.push("-a");
        }
        if long {
            flags.push("-l");
        }
        self.expect_ok(Command::View, &flags.join(" ")).await
    }

    pub async fn list_users(&mut self) -> ClientResult<String> {
        self.expect_ok(Command::List, "").await
    }

    pub async fn undo(&mut self, name: &str) -> ClientResult<String> {
        self.expect_ok(Command::Undo, name).await
    }

    pub async fn exec(&mut self, name: &str) -> ClientResult<String> {
        self.expect_ok(Command::Exec, name).await
    }

    pub async fn heartbeat(&mut self) -> ClientResult<String> {
        self.expect_ok(Command::Heartbeat, "").await
    }

    /// ADDACCESS; `write` grants read and write, otherwise read only.
    pub async fn add_access(&mut self, name: &str, user: &str, write: bool) -> ClientResult<String> {
        let flag = if write { "-W" } else { "-R" };
        self.expect_ok(Command::AddAccess, &format!("{flag} {name} {user}"))
            .await
    }

    pub async fn rem_access(&mut self, name: &str, user: &str) -> ClientResult<String> {
        self.expect_ok(Command::RemAccess, &format!("{name} {user}"))
            .await
    }

    /// Asks the name server where `name` lives and connects there.
    async fn open_storage(&mut self, command: Command, args: &str) -> ClientResult<TcpStream> {
        let addr = self.expect_ok(command, args).await?;
        if !addr.contains(':') {
            return Err(ClientError::BadAddress(addr));
        }
        debug!("{command} served by {addr}");
        Ok(TcpStream::connect(addr.as_str()).await?)
    }

    /// Whole file content.
    pub async fn read(&mut self, name: &str) -> ClientResult<String> {
        let mut content = String::new();
        self.transfer(Command::Read, name, |chunk| content.push_str(chunk))
            .await?;
        Ok(content)
    }

    /// Calls `on_word` for every word as the storage server paces them out.
    pub async fn stream<F>(&mut self, name: &str, on_word: F) -> ClientResult<()>
    where
        F: FnMut(&str),
    {
        self.transfer(Command::Stream, name, on_word).await
    }

    async fn transfer<F>(&mut self, command: Command, name: &str, mut on_data: F) -> ClientResult<()>
    where
        F: FnMut(&str),
    {
        let mut storage = self.open_storage(command, name).await?;
        send_request(
            &mut storage,
            &Request::new(command, self.username.as_str(), name),
        )
        .await?;
        loop {
            let data = check(recv_response(&mut storage).await?)?;
            if data.is_empty() {
                return Ok(());
            }
            on_data(&data);
        }
    }

    /// Opens a write session on one sentence. The sentence stays locked
    /// until the session is committed or dropped.
    pub async fn write(&mut self, name: &str, sentence: usize) -> ClientResult<WriteSession> {
        let args = format!("{name} {sentence}");
        let mut stream = self.open_storage(Command::Write, &args).await?;
        let resp = call(
            &mut stream,
            &Request::new(Command::Write, self.username.as_str(), args),
        )
        .await?;
        let sentence_text = check(resp)?;
        Ok(WriteSession {
            stream,
            username: self.username.clone(),
            sentence_text,
        })
    }
}

#[derive(Debug)]
pub struct WriteSession {
    stream: TcpStream,
    username: String,
    sentence_text: String,
}

impl WriteSession {
    /// Text returned when the session was opened or after the last edit.
    pub fn sentence(&self) -> &str {
        &self.sentence_text
    }

    /// Replaces word `index`, or appends when `index` is one past the last
    /// word. Returns the edited sentence.
    pub async fn edit(&mut self, index: usize, word: &str) -> ClientResult<String> {
        let req = Request::new(
            Command::Write,
            self.username.as_str(),
            format!("{index} {word}"),
        );
        let text = check(call(&mut self.stream, &req).await?)?;
        self.sentence_text = text.clone();
        Ok(text)
    }

    /// ETIRW: writes the edited sentence back and ends the session.
    pub async fn commit(mut self) -> ClientResult<String> {
        let req = Request::new(Command::Etirw, self.username.as_str(), "");
        check(call(&mut self.stream, &req).await?)
    }
}
