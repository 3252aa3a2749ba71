//! Executor for commands on a remote host over SSH.

use super::{env_prefix, CommandExecutor, CommandOutput};
use crate::{EngineError, Result};
use std::io::{self, Read};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One authenticated SSH session; every command gets its own channel.
pub struct SshExecutor {
    session: Mutex<ssh2::Session>,
    host: String,
}

impl SshExecutor {
    /// Connect and authenticate with a password or a private key file.
    pub fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: Option<&str>,
        private_key: Option<&Path>,
    ) -> Result<Self> {
        let tcp = TcpStream::connect((host, port))?;
        let mut sess = ssh2::Session::new()?;
        sess.set_tcp_stream(tcp);
        sess.handshake()?;

        match (private_key, password) {
            (Some(key), passphrase) => sess.userauth_pubkey_file(username, None, key, passphrase)?,
            (None, Some(password)) => sess.userauth_password(username, password)?,
            (None, None) => sess.userauth_agent(username)?,
        }

        if !sess.authenticated() {
            return Err(EngineError::Config(format!(
                "SSH authentication failed for {}@{}",
                username, host
            )));
        }

        tracing::info!(host = %host, user = %username, "SSH session established");

        Ok(Self {
            session: Mutex::new(sess),
            host: host.to_string(),
        })
    }
}

impl CommandExecutor for SshExecutor {
    fn run(&self, command: &str, env: &[(&str, &str)]) -> Result<CommandOutput> {
        let script = format!("{}{}", env_prefix(env)?, command);
        let sess = self
            .session
            .lock()
            .map_err(|_| EngineError::Config(format!("SSH session to {} is poisoned", self.host)))?;

        let mut channel = sess.channel_session()?;
        channel.exec(&format!("bash -c {}", super::shell_quote(&script)))?;

        sess.set_blocking(false);
        let drained = drain(channel.stream(0), channel.stderr());
        sess.set_blocking(true);
        let (stdout, stderr) = drained?;
        channel.wait_close()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: channel.exit_status()?,
        })
    }
}

/// Read stdout and stderr in turns until both report end of stream.
/// Readers may return `WouldBlock` while the command is still running.
fn drain(stdout: impl Read, stderr: impl Read) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Pipe::new(stdout);
    let mut err = Pipe::new(stderr);
    let mut buf = [0u8; 8192];

    while !(out.closed && err.closed) {
        let progressed = out.pump(&mut buf)? | err.pump(&mut buf)?;
        if !progressed {
            thread::sleep(POLL_INTERVAL);
        }
    }
    Ok((out.data, err.data))
}

struct Pipe<R> {
    reader: R,
    data: Vec<u8>,
    closed: bool,
}

impl<R: Read> Pipe<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            data: Vec::new(),
            closed: false,
        }
    }

    /// One read; true if data arrived.
    fn pump(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        if self.closed {
            return Ok(false);
        }
        match self.reader.read(buf) {
            Ok(0) => {
                self.closed = true;
                Ok(false)
            }
            Ok(n) => {
                self.data.extend_from_slice(&buf[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }
}
