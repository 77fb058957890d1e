//! buildmoded - The build mode session service
//!
//! Wires together:
//! - Configuration loading and reload
//! - Store initialization and state recovery
//! - The session manager
//! - The reconciliation timer
//! - The IPC server

use anyhow::{Context, Result};
use buildmode_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload, SessionEndReason,
};
use buildmode_config::load_config;
use buildmode_core::{CoreEvent, SessionError, SessionManager};
use buildmode_ipc::{IpcServer, ServerMessage};
use buildmode_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use buildmode_util::{default_config_path, format_duration, BuildModeError, ClientId, UserId};
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// buildmoded - Timed creative-mode sessions with item restrictions
#[derive(Parser, Debug)]
#[command(name = "buildmoded")]
#[command(about = "Timed build mode sessions with item restrictions", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/buildmoded/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set BUILDMODE_SOCKET env var)
    #[arg(short, long, env = "BUILDMODE_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set BUILDMODE_DATA_DIR env var)
    #[arg(short, long, env = "BUILDMODE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Users the host reports as connected.
///
/// Starts unsynced after every service start. Until the host sends
/// `SyncPresence`, everyone counts as connected.
#[derive(Debug, Default)]
struct Presence {
    synced: bool,
    online: HashSet<UserId>,
}

impl Presence {
    fn is_connected(&self, user: UserId) -> bool {
        !self.synced || self.online.contains(&user)
    }

    fn connect(&mut self, user: UserId) {
        self.online.insert(user);
    }

    fn disconnect(&mut self, user: UserId) {
        self.online.remove(&user);
    }

    fn sync(&mut self, users: impl IntoIterator<Item = UserId>) {
        self.online = users.into_iter().collect();
        self.synced = true;
    }
}

/// Main service state
struct Service {
    config_path: PathBuf,
    manager: Arc<RwLock<SessionManager>>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    presence: RwLock<Presence>,
    check_interval: watch::Sender<Duration>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            mode = ?config.restrictions.mode,
            listed_items = config.restrictions.active_list_len(),
            skipped_entries = config.warnings.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open_in_dir(&data_dir)
                .with_context(|| format!("Failed to open database in {:?}", data_dir))?,
        );

        info!(data_dir = %data_dir.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let manager = SessionManager::recover(
            config.session.clone(),
            config.restrictions.clone(),
            store.clone(),
            buildmode_util::now(),
        );

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to bind socket {:?}", socket_path))?;

        let (check_interval, _) = watch::channel(config.service.check_interval);

        Ok(Self {
            config_path: args.config.clone(),
            manager: Arc::new(RwLock::new(manager)),
            ipc: Arc::new(ipc),
            store,
            presence: RwLock::new(Presence::default()),
            check_interval,
        })
    }

    async fn run(self) -> Result<()> {
        let mut ipc_messages = self
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = self.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut interval_rx = self.check_interval.subscribe();
        let mut reconcile_timer = sweep_timer(*interval_rx.borrow_and_update());

        info!(
            socket_path = %self.ipc.socket_path().display(),
            check_interval = %format_duration(*interval_rx.borrow()),
            "Service running"
        );

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // SIGHUP: reload configuration
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    if let Err(e) = self.reload_config().await {
                        error!(error = %e, "Reload failed, keeping previous configuration");
                    }
                }

                _ = reconcile_timer.tick() => {
                    self.reconcile().await;
                }

                Ok(()) = interval_rx.changed() => {
                    let period = *interval_rx.borrow_and_update();
                    info!(check_interval = %format_duration(period), "Reconciliation timer restarted");
                    reconcile_timer = sweep_timer(period);
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(msg).await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        info!("Shutting down buildmoded");

        self.ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self.manager.read().await.persist() {
            error!(error = %e, "Failed to persist sessions, state will be lost");
        }

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        self.ipc.shutdown();
        info!("Shutdown complete");
    }

    /// One reconciliation sweep
    async fn reconcile(&self) {
        let now = buildmode_util::now();
        let presence = self.presence.read().await;

        let events = {
            let mut manager = self.manager.write().await;
            manager.reconcile(now, |user| presence.is_connected(user))
        };

        for event in events {
            self.ipc.broadcast_event(Event::new(event_payload(event)));
        }
    }

    /// Reload the config file and restart the reconciliation timer. The
    /// previous configuration stays in force on any error.
    async fn reload_config(&self) -> buildmode_util::Result<()> {
        let config = match load_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ConfigReloaded {
                        success: false,
                    }));
                return Err(BuildModeError::config(e.to_string()));
            }
        };

        let event = {
            let mut manager = self.manager.write().await;
            manager.reload(config.session.clone(), config.restrictions.clone())
        };

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ConfigReloaded { success: true }));

        restart_sweeps(&self.check_interval, config.service.check_interval);

        self.ipc.broadcast_event(Event::new(event_payload(event)));
        Ok(())
    }

    async fn handle_ipc_message(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let response = self
                    .handle_command(&client_id, request.request_id, request.command)
                    .await;

                if let Err(e) = self.ipc.send_response(&client_id, response).await {
                    debug!(client_id = %client_id, error = %e, "Client gone before response");
                }
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                        client_id: client_id.to_string(),
                        role: format!("{:?}", info.role),
                        uid: info.uid,
                    }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                        client_id: client_id.to_string(),
                    }));
            }
        }
    }

    async fn role_of(&self, client_id: &ClientId) -> ClientRole {
        self.ipc
            .get_client_info(client_id)
            .await
            .map_or(ClientRole::Observer, |info| info.role)
    }

    async fn handle_command(
        &self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = buildmode_util::now();
        let role = self.role_of(client_id).await;

        if let Err(e) = authorize(role, &command) {
            warn!(client_id = %client_id, role = ?role, error = %e, "Command refused");
            return Response::error(request_id, service_error_info(&e));
        }

        match command {
            Command::Start {
                user_id,
                mode,
                inventory,
                privileged,
            } => {
                let result = self
                    .manager
                    .write()
                    .await
                    .start(user_id, mode, inventory, privileged, now);

                match result {
                    Ok(outcome) => {
                        self.ipc
                            .broadcast_event(Event::new(event_payload(outcome.event)));
                        Response::success(
                            request_id,
                            ResponsePayload::Started {
                                session: outcome.session,
                                effects: outcome.effects,
                            },
                        )
                    }
                    Err(e) => Response::error(request_id, session_error_info(&e)),
                }
            }

            Command::End { user_id } => {
                let result =
                    self.manager
                        .write()
                        .await
                        .end(user_id, SessionEndReason::UserStop, now);

                match result {
                    Ok(outcome) => {
                        self.ipc
                            .broadcast_event(Event::new(event_payload(outcome.event)));
                        Response::success(
                            request_id,
                            ResponsePayload::Ended {
                                effects: outcome.effects,
                            },
                        )
                    }
                    Err(e) => Response::error(request_id, session_error_info(&e)),
                }
            }

            Command::GetStatus { user_id } => {
                let status = self.manager.read().await.status(user_id, now);
                Response::success(request_id, ResponsePayload::Status(status))
            }

            Command::ListActive => {
                let sessions = self.manager.read().await.list_active(now);
                Response::success(request_id, ResponsePayload::ActiveSessions(sessions))
            }

            Command::EvaluateAction {
                user_id,
                action,
                item,
            } => {
                let verdict = self
                    .manager
                    .read()
                    .await
                    .evaluate_action(user_id, &action, item.as_ref());
                Response::success(request_id, ResponsePayload::Verdict(verdict))
            }

            Command::UserConnected { user_id } => {
                self.presence.write().await.connect(user_id);
                let outcome = self.manager.write().await.user_connected(user_id, now);

                if let Some(event) = outcome.event() {
                    self.ipc
                        .broadcast_event(Event::new(event_payload(event.clone())));
                }

                Response::success(
                    request_id,
                    ResponsePayload::Reconnected {
                        effects: outcome.effects().to_vec(),
                    },
                )
            }

            Command::UserDisconnected { user_id } => {
                self.presence.write().await.disconnect(user_id);
                debug!(user_id = %user_id, "User left host");
                Response::success(request_id, ResponsePayload::Disconnected)
            }

            Command::SyncPresence { users } => {
                let online = {
                    let mut presence = self.presence.write().await;
                    presence.sync(users);
                    presence.online.len()
                };
                info!(online, "Presence synced with host");
                Response::success(request_id, ResponsePayload::PresenceSynced { online })
            }

            Command::AcknowledgeRestore { user_id } => {
                let result = self.manager.write().await.acknowledge_restore(user_id);
                match result {
                    Ok(()) => Response::success(request_id, ResponsePayload::RestoreAcknowledged),
                    Err(e) => Response::error(request_id, session_error_info(&e)),
                }
            }

            Command::ListPendingRestores => {
                let pending = self.manager.read().await.pending_restores();
                Response::success(request_id, ResponsePayload::PendingRestores(pending))
            }

            Command::ReloadConfig => match self.reload_config().await {
                Ok(()) => Response::success(request_id, ResponsePayload::ConfigReloaded),
                Err(e) => {
                    error!(error = %e, "Reload failed, keeping previous configuration");
                    Response::error(request_id, service_error_info(&e))
                }
            },

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                let manager = self.manager.read().await;
                let health = HealthStatus {
                    live: true,
                    ready: true,
                    store_ok: self.store.is_healthy(),
                    active_sessions: manager.active_count(),
                    pending_restores: manager.pending_restore_count(),
                };
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::Extend { user_id, by } => {
                let result = self.manager.write().await.extend(user_id, by, now);
                match result {
                    Ok(new_deadline) => {
                        Response::success(request_id, ResponsePayload::Extended { new_deadline })
                    }
                    Err(e) => Response::error(request_id, session_error_info(&e)),
                }
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }
}

/// Publish the sweep period. Always notifies, so the timer restarts even
/// when the period is unchanged.
fn restart_sweeps(check_interval: &watch::Sender<Duration>, period: Duration) {
    check_interval.send_modify(|current| *current = period);
}

fn sweep_timer(period: Duration) -> tokio::time::Interval {
    // First sweep one period from now; recovery already dropped stale sessions
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Check the client's role against what the command needs
fn authorize(role: ClientRole, command: &Command) -> buildmode_util::Result<()> {
    let allowed = match command {
        Command::Start { .. }
        | Command::End { .. }
        | Command::UserConnected { .. }
        | Command::UserDisconnected { .. }
        | Command::SyncPresence { .. }
        | Command::AcknowledgeRestore { .. } => role.can_mutate_sessions(),
        Command::Extend { .. } => role.can_extend(),
        Command::ReloadConfig => role.can_reload_config(),
        _ => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(BuildModeError::permission(format!(
            "{:?} role may not send this command",
            role
        )))
    }
}

fn service_error_info(error: &BuildModeError) -> ErrorInfo {
    let code = match error {
        BuildModeError::ConfigError(_) => ErrorCode::ConfigError,
        BuildModeError::PermissionDenied(_) => ErrorCode::PermissionDenied,
    };
    ErrorInfo::new(code, error.to_string())
}

fn session_error_info(error: &SessionError) -> ErrorInfo {
    let code = match error {
        SessionError::AlreadyActive => ErrorCode::AlreadyActive,
        SessionError::NotActive => ErrorCode::NotActive,
        SessionError::OnCooldown { .. } => ErrorCode::OnCooldown,
        SessionError::UnlimitedSession => ErrorCode::UnlimitedSession,
        SessionError::RestorePending => ErrorCode::RestorePending,
        SessionError::NoPendingRestore => ErrorCode::NoPendingRestore,
        SessionError::DeadlineOverflow => ErrorCode::InvalidRequest,
    };

    let info = ErrorInfo::new(code, error.to_string());
    match error {
        // Round up so a client retrying after this many seconds succeeds
        SessionError::OnCooldown { remaining } => {
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            info.with_retry_after(secs)
        }
        _ => info,
    }
}

fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::SessionStarted { user_id, deadline } => {
            EventPayload::SessionStarted { user_id, deadline }
        }
        CoreEvent::SessionEnded {
            user_id,
            reason,
            duration,
            effects,
        } => EventPayload::SessionEnded {
            user_id,
            reason,
            duration,
            effects,
        },
        CoreEvent::SessionExpired {
            user_id,
            duration,
            effects,
        } => EventPayload::SessionExpired {
            user_id,
            duration,
            effects,
        },
        CoreEvent::RestoreDeferred {
            user_id,
            expired_at,
        } => EventPayload::RestoreDeferred {
            user_id,
            expired_at,
        },
        CoreEvent::RestoreApplied { user_id, effects } => {
            EventPayload::RestoreApplied { user_id, effects }
        }
        CoreEvent::PolicyReloaded { mode, listed_items } => {
            EventPayload::PolicyReloaded { mode, listed_items }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "buildmoded starting");

    let service = Service::new(&args).await?;
    service.run().await
}
