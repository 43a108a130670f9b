use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::{DeviceProfile, DeviceSession, SessionFactory};
use crate::models::Credential;

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// Create an SSH session and authenticate with password + keyboard-interactive.
/// This is blocking, so call from a spawn_blocking context.
fn ssh_connect(host: &str, port: u16, user: &str, pass: &str, timeout_secs: u64) -> Result<ssh2::Session> {
    let addr = format!("{}:{}", host, port);
    let tcp = TcpStream::connect_timeout(
        &addr.parse::<std::net::SocketAddr>().with_context(|| format!("Invalid address {}", addr))?,
        Duration::from_secs(timeout_secs),
    )
    .context("TCP connection failed")?;

    tcp.set_read_timeout(Some(Duration::from_secs(timeout_secs))).ok();
    tcp.set_write_timeout(Some(Duration::from_secs(timeout_secs))).ok();

    let mut session = ssh2::Session::new().context("Failed to create SSH session")?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_millis(timeout_secs));
    session.handshake().context("SSH handshake failed")?;

    // Try password auth first
    match session.userauth_password(user, pass) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // Try keyboard-interactive auth (needed for Arista EOS and similar)
    let mut prompter = PasswordPrompt { password: pass.to_string() };
    let _ = session.userauth_keyboard_interactive(user, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        bail!("SSH authentication failed: all methods exhausted")
    }
}

/// libssh2 takes its timeout in u32 milliseconds
fn timeout_millis(timeout_secs: u64) -> u32 {
    u32::try_from(timeout_secs.saturating_mul(1000)).unwrap_or(u32::MAX)
}

/// CLI prompt of one device, learned from the first prompt it prints.
/// Until then any line ending in `#` or `>` counts as a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Prompt {
    hostname: Option<String>,
}

impl Prompt {
    fn named(hostname: &str) -> Self {
        Self {
            hostname: Some(hostname.to_string()).filter(|h| !h.is_empty()),
        }
    }

    /// `R1>`, `R1#` and `R1(config-if-Et1)#` all yield `R1`
    fn learn(output: &str) -> Self {
        let name = last_line(output)
            .strip_suffix(['#', '>'])
            .map(|body| body.split('(').next().unwrap_or(body).trim())
            .unwrap_or_default();
        Self::named(name)
    }

    /// True when the last line of `output` is this device's prompt, in any
    /// mode, or a password prompt
    fn matches(&self, output: &str) -> bool {
        let line = last_line(output);
        if line.ends_with("assword:") {
            return true;
        }
        let Some(body) = line.strip_suffix(['#', '>']) else {
            return false;
        };
        match &self.hostname {
            None => true,
            Some(hostname) => body
                .strip_prefix(hostname.as_str())
                .is_some_and(|mode| mode.is_empty() || (mode.starts_with('(') && mode.ends_with(')'))),
        }
    }
}

fn last_line(output: &str) -> &str {
    let trimmed = output.trim_end();
    trimmed
        .rsplit('\n')
        .next()
        .unwrap_or(trimmed)
        .trim_start_matches('\r')
}

/// Interactive CLI shell on one device
struct Shell {
    session: ssh2::Session,
    channel: ssh2::Channel,
    timeout: Duration,
    prompt: Prompt,
}

impl Shell {
    fn open(host: &str, cred: &Credential, profile: &DeviceProfile) -> Result<Self> {
        let session = ssh_connect(host, profile.port, &cred.username, &cred.password, profile.timeout_secs)?;
        // Short reads so prompt detection can poll
        session.set_timeout(500);

        let mut channel = session.channel_session().context("Failed to open channel")?;
        channel
            .request_pty("vt100", None, Some((200, 24, 0, 0)))
            .context("Failed to request PTY")?;
        channel.shell().context("Failed to start shell")?;

        let mut shell = Self {
            session,
            channel,
            timeout: Duration::from_secs(profile.timeout_secs),
            prompt: Prompt::default(),
        };
        let banner = shell.read_until_prompt()?;
        shell.prompt = Prompt::learn(&banner);
        tracing::debug!("Prompt hostname for {}: {:?}", host, shell.prompt.hostname);
        shell.exec("terminal length 0")?;
        Ok(shell)
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.channel
            .write_all(format!("{}\n", line).as_bytes())
            .context("Failed to write to shell")?;
        self.channel.flush().ok();
        Ok(())
    }

    /// Read until the output ends in the device prompt or a password
    /// prompt, or the session timeout elapses.
    fn read_until_prompt(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let mut output = String::new();
        let mut buf = [0u8; 4096];

        loop {
            match self.channel.read(&mut buf) {
                Ok(0) if self.channel.eof() => bail!("Session closed by device"),
                Ok(0) => {}
                Ok(n) => output.push_str(&String::from_utf8_lossy(&buf[..n])),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(anyhow!(e).context("Failed to read from shell")),
            }

            if self.prompt.matches(&output) {
                return Ok(output);
            }
            if Instant::now() >= deadline {
                bail!("Timed out waiting for prompt");
            }
        }
    }

    fn exec(&mut self, command: &str) -> Result<String> {
        self.write_line(command)?;
        let raw = self.read_until_prompt()?;
        Ok(strip_echo_and_prompt(&raw, command, &self.prompt))
    }

    fn enable(&mut self, secret: Option<&str>) -> Result<()> {
        self.write_line("enable")?;
        let out = self.read_until_prompt()?;
        if out.trim_end().ends_with(':') {
            self.write_line(secret.unwrap_or_default())?;
            let out = self.read_until_prompt()?;
            if !out.trim_end().ends_with('#') {
                bail!("Failed to enter privileged mode");
            }
        }
        Ok(())
    }

    fn configure(&mut self, lines: &[String]) -> Result<String> {
        let mut transcript = self.exec("configure terminal")?;
        for line in lines {
            // the prompt changes as soon as the new hostname is applied
            if let Some(name) = line.trim().strip_prefix("hostname ") {
                self.prompt = Prompt::named(name.trim());
            }
            let out = self.exec(line)?;
            if is_rejected(&out) {
                let _ = self.exec("end");
                bail!("Command rejected: '{}': {}", line, out.trim());
            }
            transcript.push_str(&out);
        }
        transcript.push_str(&self.exec("end")?);
        Ok(transcript)
    }

    fn close(mut self) {
        let _ = self.write_line("exit");
        let _ = self.channel.close();
        let _ = self.session.disconnect(None, "closing", None);
    }
}

fn is_rejected(output: &str) -> bool {
    output.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with("% Invalid") || l.starts_with("% Incomplete") || l.starts_with("% Ambiguous")
    })
}

/// Drop the echoed command line and the trailing prompt line
fn strip_echo_and_prompt(raw: &str, command: &str, prompt: &Prompt) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.first().is_some_and(|l| l.trim_end().ends_with(command.trim())) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| prompt.matches(l)) {
        lines.pop();
    }
    lines.join("\n")
}

/// SshSession drives an interactive shell on a blocking thread per call
pub struct SshSession {
    shell: Option<Shell>,
    enable_secret: Option<String>,
}

impl SshSession {
    async fn with_shell<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Shell) -> Result<T> + Send + 'static,
    {
        let mut shell = self.shell.take().ok_or_else(|| anyhow!("Session is closed"))?;
        let (shell, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut shell);
            (shell, result)
        })
        .await
        .map_err(|e| anyhow!("Task join error: {}", e))?;
        self.shell = Some(shell);
        result
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    async fn enable(&mut self) -> Result<()> {
        let secret = self.enable_secret.clone();
        self.with_shell(move |shell| shell.enable(secret.as_deref())).await
    }

    async fn send_config(&mut self, lines: &[String]) -> Result<String> {
        let lines = lines.to_vec();
        self.with_shell(move |shell| shell.configure(&lines)).await
    }

    async fn send_command(&mut self, command: &str) -> Result<String> {
        let command = command.to_string();
        self.with_shell(move |shell| shell.exec(&command)).await
    }

    async fn close(&mut self) {
        if let Some(shell) = self.shell.take() {
            let _ = tokio::task::spawn_blocking(move || shell.close()).await;
        }
    }
}

/// Opens SSH sessions via libssh2
#[derive(Debug, Clone, Default)]
pub struct SshSessionFactory;

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(
        &self,
        address: &str,
        credential: &Credential,
        profile: &DeviceProfile,
    ) -> Result<Box<dyn DeviceSession>> {
        let host = address.to_string();
        let cred = credential.clone();
        let prof = profile.clone();

        let shell = tokio::task::spawn_blocking(move || Shell::open(&host, &cred, &prof))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))??;

        tracing::debug!("Opened {} session to {} as {}", profile.name, address, credential.username);
        Ok(Box::new(SshSession {
            shell: Some(shell),
            enable_secret: profile.enable_secret.clone(),
        }))
    }
}
