use super::*;

/// One interactive shell session to a device.
///
/// Implements the driver contract: open, send command, close, liveness.
/// Output is accumulated until the vendor prompt appears; pagination prompts
/// are answered automatically and stripped from the returned text.
pub struct ShellSession {
    client: Client,
    to_shell: Sender<String>,
    from_shell: Receiver<String>,
    profile: &'static VendorProfile,
    device_addr: String,
    prompt: String,
    socket_timeout: Duration,
}

fn last_line(buffer: &str) -> &str {
    match buffer.rfind('\n') {
        Some(pos) => &buffer[pos + 1..],
        None => buffer,
    }
}

fn classify_connect_error(device: &str, err: async_ssh2_tokio::Error) -> NetopsError {
    let message = err.to_string();
    if message.to_ascii_lowercase().contains("auth") {
        NetopsError::AuthenticationFailure {
            device: device.to_string(),
        }
    } else {
        NetopsError::ConnectionFailure {
            device: device.to_string(),
            reason: message,
        }
    }
}

enum TailAction {
    AnswerMore(usize),
    PromptFound(String),
    Keep,
}

impl ShellSession {
    pub(super) async fn open(
        credentials: &ResolvedCredentials,
        kind: DriverKind,
        limits: &SessionLimits,
    ) -> Result<ShellSession> {
        let profile = profile_for(kind);
        let device_addr = format!(
            "{}@{}:{}",
            credentials.username, credentials.hostname, credentials.port
        );

        let ssh_config = Config {
            preferred: config::compatibility_preferred(),
            inactivity_timeout: Some(config::INACTIVITY_TIMEOUT),
            ..Default::default()
        };

        let connect = Client::connect_with_config(
            (credentials.hostname.clone(), credentials.port),
            &credentials.username,
            AuthMethod::with_password(credentials.password.expose_secret()),
            ServerCheckMethod::NoCheck,
            ssh_config,
        );
        let client = match tokio::time::timeout(limits.transport_open_timeout, connect).await {
            Err(_) => {
                return Err(NetopsError::TransportOpenTimeout {
                    device: device_addr,
                });
            }
            Ok(Err(err)) => return Err(classify_connect_error(&device_addr, err)),
            Ok(Ok(client)) => client,
        };
        debug!("{device_addr} transport connected");

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{device_addr} shell ready");

        let (to_shell, mut from_user) = mpsc::channel::<String>(256);
        let (to_user, from_shell) = mpsc::channel::<String>(256);

        let io_addr = device_addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = from_user.recv() => {
                        if let Err(err) = channel.data(data.as_bytes()).await {
                            debug!("{io_addr} failed to write to shell: {err:?}");
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                if let Ok(text) = std::str::from_utf8(data)
                                    && to_user.send(text.to_string()).await.is_err()
                                {
                                    debug!("{io_addr} output receiver dropped; stopping I/O task");
                                    break;
                                }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{io_addr} shell exited with status {exit_status}");
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{io_addr} shell sent EOF");
                                break;
                            }
                            _ => {}
                        }
                    },
                    else => break,
                }
            }
            debug!("{io_addr} SSH I/O task ended");
        });

        let mut session = ShellSession {
            client,
            to_shell,
            from_shell,
            profile,
            device_addr,
            prompt: String::new(),
            socket_timeout: limits.socket_timeout,
        };

        session
            .wait_initial_prompt(limits.transport_open_timeout)
            .await?;

        if session.profile.needs_enable(&session.prompt) && credentials.enable_password.is_some() {
            session.enter_enable_mode(credentials).await?;
        }

        if let Some(command) = session.profile.disable_paging_command {
            // Best effort: some devices reject it at low privilege levels.
            if let Err(err) = session.send_command(command).await {
                debug!("{} disable paging failed: {err}", session.device_addr);
            }
        }

        info!("session open: {}", session.device_addr);
        Ok(session)
    }

    async fn wait_initial_prompt(&mut self, timeout: Duration) -> Result<()> {
        let device = self.device_addr.clone();
        let mut buffer = String::new();

        let wait = tokio::time::timeout(timeout, async {
            loop {
                match self.from_shell.recv().await {
                    Some(chunk) => {
                        buffer.push_str(&chunk);
                        let prompt = {
                            let tail = last_line(&buffer);
                            self.profile
                                .matches_prompt(tail)
                                .then(|| tail.to_string())
                        };
                        if let Some(prompt) = prompt {
                            self.prompt = prompt;
                            return Ok(());
                        }
                    }
                    None => {
                        return Err(NetopsError::ChannelClosed {
                            device: device.clone(),
                        });
                    }
                }
            }
        })
        .await;

        match wait {
            Err(_) => Err(NetopsError::TransportOpenTimeout {
                device: self.device_addr.clone(),
            }),
            Ok(result) => result,
        }
    }

    /// Climbs from the unprivileged login mode into enable mode, answering
    /// the secondary password prompt with the enable secret.
    async fn enter_enable_mode(&mut self, credentials: &ResolvedCredentials) -> Result<()> {
        let Some(enable_command) = self.profile.enable_command else {
            return Ok(());
        };
        let Some(secret) = credentials.enable_password.as_ref() else {
            return Ok(());
        };

        debug!("{} entering privileged mode", self.device_addr);
        let device = self.device_addr.clone();
        self.to_shell
            .send(format!("{enable_command}\n"))
            .await
            .map_err(|_| NetopsError::ChannelClosed {
                device: device.clone(),
            })?;

        let timeout = self.socket_timeout;
        let mut buffer = String::new();

        let wait = tokio::time::timeout(timeout, async {
            loop {
                match self.from_shell.recv().await {
                    Some(chunk) => {
                        buffer.push_str(&chunk);
                        enum EnableStep {
                            SendSecret,
                            Done(String),
                            Wait,
                        }
                        let step = {
                            let tail = last_line(&buffer);
                            if self.profile.matches_enable_password_prompt(tail) {
                                EnableStep::SendSecret
                            } else if self.profile.matches_prompt(tail)
                                && !self.profile.needs_enable(tail)
                            {
                                EnableStep::Done(tail.to_string())
                            } else {
                                EnableStep::Wait
                            }
                        };
                        match step {
                            EnableStep::SendSecret => {
                                buffer.clear();
                                self.to_shell
                                    .send(format!("{}\n", secret.expose_secret()))
                                    .await
                                    .map_err(|_| NetopsError::ChannelClosed {
                                        device: device.clone(),
                                    })?;
                            }
                            EnableStep::Done(prompt) => {
                                self.prompt = prompt;
                                return Ok(());
                            }
                            EnableStep::Wait => {}
                        }
                    }
                    None => {
                        return Err(NetopsError::ChannelClosed {
                            device: device.clone(),
                        });
                    }
                }
            }
        })
        .await;

        match wait {
            Err(_) => Err(NetopsError::AuthenticationFailure {
                device: self.device_addr.clone(),
            }),
            Ok(result) => result,
        }
    }

    /// Sends a command and waits for the full output using the session's
    /// default socket timeout.
    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        let timeout = self.socket_timeout;
        self.send_command_with_timeout(command, timeout).await
    }

    /// Sends a command and accumulates output until the vendor prompt
    /// returns, answering pagination prompts along the way.
    pub async fn send_command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String> {
        // Drop residual data from a previous exchange.
        while self.from_shell.try_recv().is_ok() {}

        let device = self.device_addr.clone();
        self.to_shell
            .send(format!("{command}\n"))
            .await
            .map_err(|_| NetopsError::ChannelClosed {
                device: device.clone(),
            })?;

        let mut collected = String::new();
        let more_response = self.profile.more_response;

        let wait = tokio::time::timeout(timeout, async {
            loop {
                match self.from_shell.recv().await {
                    Some(chunk) => {
                        collected.push_str(&chunk);
                        let action = {
                            let tail = last_line(&collected);
                            if self.profile.matches_more(tail) {
                                TailAction::AnswerMore(tail.len())
                            } else if self.profile.matches_prompt(tail) {
                                TailAction::PromptFound(tail.to_string())
                            } else {
                                TailAction::Keep
                            }
                        };
                        match action {
                            TailAction::AnswerMore(marker_len) => {
                                // Strip the marker so it never reaches the output.
                                let cut = collected.len() - marker_len;
                                collected.truncate(cut);
                                self.to_shell
                                    .send(more_response.to_string())
                                    .await
                                    .map_err(|_| NetopsError::ChannelClosed {
                                        device: device.clone(),
                                    })?;
                            }
                            TailAction::PromptFound(prompt) => {
                                self.prompt = prompt;
                                return Ok(());
                            }
                            TailAction::Keep => {}
                        }
                    }
                    None => {
                        return Err(NetopsError::ChannelClosed {
                            device: device.clone(),
                        });
                    }
                }
            }
        })
        .await;

        match wait {
            Err(_) => Err(NetopsError::CommandTimeout {
                device: self.device_addr.clone(),
                elapsed_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(err)) => Err(err),
            Ok(Ok(())) => Ok(Self::clean_output(command, &collected)),
        }
    }

    /// Strips the echoed command from the head and the prompt from the tail.
    fn clean_output(command: &str, collected: &str) -> String {
        let mut content: &str = collected;
        if !command.is_empty() && content.starts_with(command) {
            content = content
                .strip_prefix(command)
                .unwrap_or(content)
                .trim_start_matches(['\r', '\n']);
        }

        let content = match content.rfind('\n') {
            Some(pos) => &content[..pos],
            None => "",
        };
        content.trim_end_matches('\r').to_string()
    }

    /// First output line the vendor flags as an error, if any.
    pub fn vendor_error(&self, output: &str) -> Option<String> {
        self.profile.vendor_error(output)
    }

    /// The vendor profile this session was opened with.
    pub fn profile(&self) -> &'static VendorProfile {
        self.profile
    }

    /// Prompt captured after the most recent exchange.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Whether the underlying SSH connection is still up.
    pub fn is_alive(&self) -> bool {
        !self.client.is_closed()
    }

    /// Attempts a graceful logout, then lets the transport drop.
    pub async fn close(&mut self) -> Result<()> {
        debug!("closing session: {}", self.device_addr);
        self.from_shell.close();

        if self.is_alive() {
            if let Err(err) = self.to_shell.send("exit\n".to_string()).await {
                debug!("{} failed to send exit: {err:?}", self.device_addr);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!("session closed: {}", self.device_addr);
        Ok(())
    }
}
