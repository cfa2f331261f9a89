//! Retry-protected remote command execution.
//!
//! Every call to [`RemoteExecutor::execute`] opens its own session, runs one
//! command up to `max_attempts` times with a fixed backoff between failed
//! attempts, closes the session and hands back the last attempt's exit status
//! and output. Whether a non-zero status is fatal is the caller's decision.
//!
//! # Failure semantics
//!
//! - Non-zero exit: retried (when enabled), then returned as-is
//! - Unreachable host or rejected credentials: returned as an error, not retried
//! - User interrupt: noticed between attempts, never in the middle of one
//!
//! The transport sits behind [`RemoteConnector`] / [`RemoteSession`]; the
//! production implementation is [`SshConnector`] on top of `ssh2`.

use crate::config::HostConfig;
use crate::error::{QoeError, Result};
use crate::wait;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Bounded retry with fixed backoff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Policy that runs a command exactly once.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

/// Outcome of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An open command session on one host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `command` to completion.
    async fn exec(&mut self, command: &str) -> Result<CommandOutput>;
}

/// Opens sessions to hosts.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Establish and authenticate a session.
    async fn connect(&self, host: &HostConfig) -> Result<Box<dyn RemoteSession>>;
}

/// Runs commands on remote hosts with the configured retry policy.
#[derive(Clone)]
pub struct RemoteExecutor {
    connector: Arc<dyn RemoteConnector>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RemoteExecutor {
    /// Create an executor.
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            policy,
            cancel,
        }
    }

    /// Retry policy in effect.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `command` on `host`, retrying non-zero exits when `retry` is set.
    pub async fn execute(
        &self,
        host: &HostConfig,
        command: &str,
        retry: bool,
    ) -> Result<CommandOutput> {
        let policy = if retry {
            self.policy
        } else {
            RetryPolicy::once()
        };
        self.execute_with(host, command, policy).await
    }

    /// Run `command` on `host` with an explicit policy.
    pub async fn execute_with(
        &self,
        host: &HostConfig,
        command: &str,
        policy: RetryPolicy,
    ) -> Result<CommandOutput> {
        let max_attempts = policy.max_attempts.max(1);
        let mut session = self.connector.connect(host).await?;

        let mut attempt = 1;
        loop {
            debug!(
                host = %host.mng_ip,
                attempt,
                "running '{}' (try #{}/{})",
                command,
                attempt,
                max_attempts
            );
            let output = session.exec(command).await?;
            debug!(
                host = %host.mng_ip,
                exit_code = output.exit_code,
                "stdout: {}\nstderr: {}",
                output.stdout.trim_end(),
                output.stderr.trim_end()
            );

            if output.success() || attempt >= max_attempts {
                return Ok(output);
            }

            info!(
                "'{}' on {} exited with {}, retrying in {:?}",
                command, host.mng_ip, output.exit_code, policy.backoff
            );
            wait::pause(&self.cancel, policy.backoff).await?;
            attempt += 1;
        }
    }

    /// Run `command` and turn a final non-zero exit into [`QoeError::SetupFailed`].
    pub async fn require(&self, host: &HostConfig, command: &str) -> Result<CommandOutput> {
        let output = self.execute(host, command, true).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(QoeError::SetupFailed {
                host: host.mng_ip.clone(),
                command: command.to_string(),
                exit_code: output.exit_code,
            })
        }
    }
}

/// SSH transport with password authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, host: &HostConfig) -> Result<Box<dyn RemoteSession>> {
        let host = host.clone();
        let session = tokio::task::spawn_blocking(move || open_ssh(&host))
            .await
            .map_err(|e| QoeError::Io(io::Error::other(e)))??;
        Ok(Box::new(session))
    }
}

fn open_ssh(host: &HostConfig) -> Result<SshSession> {
    let addr = format!("{}:{}", host.mng_ip, host.port);
    let tcp = TcpStream::connect(&addr).map_err(|e| QoeError::Connect {
        host: addr.clone(),
        reason: e.to_string(),
    })?;

    let mut session = ssh2::Session::new().map_err(|e| QoeError::Connect {
        host: addr.clone(),
        reason: e.to_string(),
    })?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| QoeError::Connect {
        host: addr.clone(),
        reason: e.to_string(),
    })?;

    let auth = session.userauth_password(&host.user, &host.password);
    if auth.is_err() || !session.authenticated() {
        return Err(QoeError::Auth {
            host: addr,
            user: host.user.clone(),
        });
    }

    Ok(SshSession {
        host: host.mng_ip.clone(),
        session,
    })
}

struct SshSession {
    host: String,
    session: ssh2::Session,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        let session = self.session.clone();
        let host = self.host.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || run_channel(&host, &session, &command))
            .await
            .map_err(|e| QoeError::Io(io::Error::other(e)))?
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let _ = self.session.disconnect(None, "done", None);
    }
}

fn run_channel(host: &str, session: &ssh2::Session, command: &str) -> Result<CommandOutput> {
    let ssh_err = |source| QoeError::Ssh {
        host: host.to_string(),
        source,
    };

    let mut channel = session.channel_session().map_err(ssh_err)?;
    channel.exec(command).map_err(ssh_err)?;

    // both streams share one channel window, so they are drained together
    let mut out = channel.stream(0);
    let mut err = channel.stderr();
    session.set_blocking(false);
    let drained = pump_streams(&mut out, &mut err, || channel.eof());
    session.set_blocking(true);
    let (stdout, stderr) = drained?;

    channel.wait_close().map_err(ssh_err)?;
    let exit_code = channel.exit_status().map_err(ssh_err)?;

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Read two non-blocking streams until `at_eof` reports the end and neither
/// has anything left.
fn pump_streams<O: Read + ?Sized, E: Read + ?Sized>(
    out: &mut O,
    err: &mut E,
    mut at_eof: impl FnMut() -> bool,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let progressed = pull(out, &mut stdout, &mut buf)? | pull(err, &mut stderr, &mut buf)?;
        if !progressed {
            if at_eof() {
                return Ok((stdout, stderr));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn pull<R: Read + ?Sized>(stream: &mut R, sink: &mut Vec<u8>, buf: &mut [u8]) -> io::Result<bool> {
    match stream.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(true),
        Err(e) => Err(e),
    }
}
