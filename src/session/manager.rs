use super::*;

/// Pool-bounded session opener and command executor.
///
/// One instance owns one counting semaphore; the process-wide instance is
/// [`MANAGER`]. Callers beyond the bound suspend until a slot frees. Clones
/// share the same semaphore.
#[derive(Clone)]
pub struct SessionManager {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot in the session pool. Dropping it frees the slot, on every
/// exit path including panic and cancellation.
pub struct SessionSlot {
    _permit: OwnedSemaphorePermit,
}

/// An open device session together with its pool slot.
pub struct SessionLease {
    session: ShellSession,
    _slot: SessionSlot,
}

impl SessionLease {
    /// Graceful close. The slot frees when the lease drops.
    pub async fn close(mut self) -> Result<()> {
        self.session.close().await
    }
}

impl std::ops::Deref for SessionLease {
    type Target = ShellSession;

    fn deref(&self) -> &ShellSession {
        &self.session
    }
}

impl std::ops::DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut ShellSession {
        &mut self.session
    }
}

impl SessionManager {
    /// Manager with the default pool size.
    pub fn new() -> Self {
        Self::with_capacity(config::DEFAULT_MAX_SESSIONS)
    }

    /// Manager with an explicit pool size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot. Callers running their own transports can use
    /// this to respect the process-wide session bound.
    pub async fn acquire_slot(&self) -> Result<SessionSlot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| NetopsError::InvalidOperation("session pool closed".to_string()))?;
        Ok(SessionSlot { _permit: permit })
    }

    /// Acquires a slot, selects the vendor driver, opens and authenticates
    /// the transport, and waits for the first prompt.
    pub async fn open_session(&self, params: &ConnectionParams) -> Result<SessionLease> {
        let slot = self.acquire_slot().await?;
        let kind = select_driver(params.brand, &params.credentials.platform);
        debug!(
            "opening {} session to {}",
            kind.as_str(),
            params.credentials.hostname
        );
        let session = ShellSession::open(&params.credentials, kind, &params.limits).await?;
        Ok(SessionLease {
            session,
            _slot: slot,
        })
    }

    /// Runs one command over a fresh session.
    ///
    /// Transport and authentication failures come back as a failed result
    /// carrying the error and elapsed time, never as a panic or process
    /// crash; the pool slot is always released.
    pub async fn execute_command(
        &self,
        params: &ConnectionParams,
        command: &str,
    ) -> CommandExecutionResult {
        let started = Instant::now();
        let mut lease = match self.open_session(params).await {
            Ok(lease) => lease,
            Err(err) => {
                return CommandExecutionResult::failure(params, command, &err, started.elapsed());
            }
        };

        let outcome = lease
            .send_command_with_timeout(command, params.limits.socket_timeout)
            .await;
        if let Err(err) = lease.close().await {
            debug!("close after command failed: {err}");
        }

        match outcome {
            Ok(raw) => CommandExecutionResult::success(params, command, raw, started.elapsed()),
            Err(err) => CommandExecutionResult::failure(params, command, &err, started.elapsed()),
        }
    }

    /// Runs a command sequence over one session with per-command results.
    pub async fn execute_commands(
        &self,
        params: &ConnectionParams,
        commands: &[String],
    ) -> Vec<CommandExecutionResult> {
        let started = Instant::now();
        let mut lease = match self.open_session(params).await {
            Ok(lease) => lease,
            Err(err) => {
                return commands
                    .iter()
                    .map(|command| {
                        CommandExecutionResult::failure(params, command, &err, started.elapsed())
                    })
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(commands.len());
        let mut channel_lost = false;
        for command in commands {
            if channel_lost {
                let err = NetopsError::ChannelClosed {
                    device: params.credentials.hostname.clone(),
                };
                results.push(CommandExecutionResult::failure(
                    params,
                    command,
                    &err,
                    Duration::ZERO,
                ));
                continue;
            }

            let step_started = Instant::now();
            match lease
                .send_command_with_timeout(command, params.limits.socket_timeout)
                .await
            {
                Ok(raw) => results.push(CommandExecutionResult::success(
                    params,
                    command,
                    raw,
                    step_started.elapsed(),
                )),
                Err(err) => {
                    channel_lost = matches!(err, NetopsError::ChannelClosed { .. });
                    results.push(CommandExecutionResult::failure(
                        params,
                        command,
                        &err,
                        step_started.elapsed(),
                    ));
                }
            }
        }

        if let Err(err) = lease.close().await {
            debug!("close after command sequence failed: {err}");
        }
        results
    }

    /// Runs one command and attempts structured parsing of the output.
    ///
    /// Execution success is purely transport-level; a parse failure keeps the
    /// raw output with `parse_method = raw_only` and the parse error attached.
    pub async fn execute_with_parsing(
        &self,
        params: &ConnectionParams,
        command: &str,
    ) -> CommandExecutionResult {
        let started = Instant::now();
        let mut result = self.execute_command(params, command).await;

        if result.status == ExecutionStatus::Success {
            match params.brand {
                Some(brand) => {
                    let outcome = parser::parse(&result.raw_output, command, brand);
                    if outcome.success {
                        result.parsed_data = outcome.data;
                        result.parse_method = Some(outcome.parse_method);
                    } else {
                        result.parse_method = Some(ParseMethod::RawOnly);
                        result.parse_error = outcome.error;
                    }
                }
                None => {
                    // No brand hint: fall back to detecting it from the
                    // platform string and the output itself.
                    let facts = HostFacts {
                        platform: Some(params.credentials.platform.clone()),
                        ..Default::default()
                    };
                    match parser::parse_with_detection(&result.raw_output, command, &facts) {
                        Some(outcome) if outcome.success => {
                            result.parsed_data = outcome.data;
                            result.parse_method = Some(outcome.parse_method);
                        }
                        Some(outcome) => {
                            result.parse_method = Some(ParseMethod::RawOnly);
                            result.parse_error = outcome.error;
                        }
                        None => {
                            result.parse_method = Some(ParseMethod::RawOnly);
                            result.parse_error =
                                Some("device brand could not be determined".to_string());
                        }
                    }
                }
            }
            result.elapsed_ms = started.elapsed().as_millis() as u64;
        }

        result
    }

    /// Probes a device by running the vendor's version command.
    pub async fn test_connectivity(&self, params: &ConnectionParams) -> ConnectivityReport {
        let started = Instant::now();
        let kind = select_driver(params.brand, &params.credentials.platform);
        let result = self
            .execute_command(params, profile_for(kind).version_command)
            .await;

        ConnectivityReport {
            hostname: params.credentials.hostname.clone(),
            status: result.status,
            response_time_ms: started.elapsed().as_millis() as u64,
            driver: kind,
            output_bytes: result.raw_output.len(),
            error: result.error,
        }
    }

    /// Retrieves the device's full running configuration.
    pub async fn fetch_configuration(&self, params: &ConnectionParams) -> Result<String> {
        let mut lease = self.open_session(params).await?;
        let profile = lease.profile();

        let outcome = lease
            .send_command_with_timeout(profile.config_view_command, params.limits.socket_timeout)
            .await;
        if let Err(err) = lease.close().await {
            debug!("close after config fetch failed: {err}");
        }

        let raw = outcome?;
        if let Some(message) = profile.vendor_error(&raw) {
            return Err(NetopsError::CommandRejected {
                device: params.credentials.hostname.clone(),
                command: profile.config_view_command.to_string(),
                message,
            });
        }
        Ok(raw)
    }

    /// Pushes configuration lines to the device, entering and leaving the
    /// configuration view around them. Blank lines and comment lines are
    /// skipped. The first vendor-rejected line aborts the push.
    pub async fn push_configuration(
        &self,
        params: &ConnectionParams,
        lines: &[String],
    ) -> Result<usize> {
        let mut lease = self.open_session(params).await?;
        let profile = lease.profile();
        let device = params.credentials.hostname.clone();
        let timeout = params.limits.socket_timeout;

        let push = async {
            if let Some(enter) = profile.enter_config_command {
                let output = lease.send_command_with_timeout(enter, timeout).await?;
                if let Some(message) = profile.vendor_error(&output) {
                    return Err(NetopsError::ConfigPushRejected {
                        device: device.clone(),
                        line: enter.to_string(),
                        message,
                    });
                }
            }

            let mut applied = 0usize;
            for line in lines {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('!') || trimmed.starts_with('#') {
                    continue;
                }
                let output = lease.send_command_with_timeout(trimmed, timeout).await?;
                if let Some(message) = profile.vendor_error(&output) {
                    return Err(NetopsError::ConfigPushRejected {
                        device: device.clone(),
                        line: trimmed.to_string(),
                        message,
                    });
                }
                applied += 1;
            }

            if let Some(exit) = profile.exit_config_command {
                let _ = lease.send_command_with_timeout(exit, timeout).await;
            }
            if let Some(save) = profile.save_command {
                let _ = lease.send_command_with_timeout(save, timeout).await;
            }
            Ok(applied)
        };

        let outcome = push.await;
        if let Err(err) = lease.close().await {
            debug!("close after config push failed: {err}");
        }
        outcome
    }

    /// Gathers version output plus the vendor's inventory view.
    pub async fn fetch_device_facts(&self, params: &ConnectionParams) -> Result<DeviceFacts> {
        let mut lease = self.open_session(params).await?;
        let profile = lease.profile();
        let timeout = params.limits.socket_timeout;

        let facts = async {
            let version_output = lease
                .send_command_with_timeout(profile.version_command, timeout)
                .await?;
            let inventory_output = match profile.inventory_command {
                Some(command) => lease.send_command_with_timeout(command, timeout).await.ok(),
                None => None,
            };
            Ok(DeviceFacts {
                hostname: params.credentials.hostname.clone(),
                driver: profile.kind,
                version_output,
                inventory_output,
            })
        };

        let outcome = facts.await;
        if let Err(err) = lease.close().await {
            debug!("close after facts fetch failed: {err}");
        }
        outcome
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The narrow transport seam the snapshot/rollback engine drives.
#[async_trait]
pub trait ConfigTransport: Send + Sync {
    /// Retrieves the device's full configuration text.
    async fn fetch_configuration(&self, params: &ConnectionParams) -> Result<String>;

    /// Pushes configuration lines; returns how many were applied.
    async fn push_configuration(&self, params: &ConnectionParams, lines: &[String])
    -> Result<usize>;

    /// Verifies the device is reachable; returns the response time in ms.
    async fn check_alive(&self, params: &ConnectionParams) -> Result<u64>;
}

#[async_trait]
impl ConfigTransport for SessionManager {
    async fn fetch_configuration(&self, params: &ConnectionParams) -> Result<String> {
        SessionManager::fetch_configuration(self, params).await
    }

    async fn push_configuration(
        &self,
        params: &ConnectionParams,
        lines: &[String],
    ) -> Result<usize> {
        SessionManager::push_configuration(self, params, lines).await
    }

    async fn check_alive(&self, params: &ConnectionParams) -> Result<u64> {
        let report = self.test_connectivity(params).await;
        match report.status {
            ExecutionStatus::Success => Ok(report.response_time_ms),
            ExecutionStatus::Failed => Err(NetopsError::ConnectionFailure {
                device: report.hostname,
                reason: report
                    .error
                    .unwrap_or_else(|| "connectivity probe failed".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_bound_is_respected() {
        let manager = Arc::new(SessionManager::with_capacity(2));
        assert_eq!(manager.capacity(), 2);

        let hold = Duration::from_millis(50);
        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let slot = manager.acquire_slot().await.expect("slot");
                tokio::time::sleep(hold).await;
                drop(slot);
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        // Three holders over two slots force at least two sequential rounds.
        assert!(started.elapsed() >= hold * 2);
        assert_eq!(manager.available_slots(), 2);
    }

    #[tokio::test]
    async fn dropping_a_slot_frees_it() {
        let manager = SessionManager::with_capacity(1);
        let slot = manager.acquire_slot().await.expect("slot");
        assert_eq!(manager.available_slots(), 0);
        drop(slot);
        assert_eq!(manager.available_slots(), 1);
    }
}
