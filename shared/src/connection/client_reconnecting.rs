use super::client_connecting::{connect_client, starting_client_failed};
use super::{
    ConnectionContext, ConnectionNotice, ConnectionState, ConnectionStateKind, SceneLoader,
    Transition, Transport,
};
use crate::protocol::ConnectStatus;
use crate::session::ClientId;
use log::{debug, info};

/// Where the current reconnection attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum Phase {
    /// No attempt scheduled; waiting for the outcome of the last one.
    #[default]
    Idle,
    BetweenAttempts { deadline: f32 },
    ShuttingDown,
    BeforeFirstAttempt { deadline: f32 },
}

/// Lost the host; retrying a bounded number of times.
///
/// Behaves like `ClientConnecting` once an attempt is underway, except that
/// a failed attempt schedules the next one instead of giving up.
#[derive(Debug, Default)]
pub(crate) struct ClientReconnectingState {
    attempts: u32,
    phase: Phase,
}

impl ClientReconnectingState {
    /// Schedules the next attempt and runs it as far as it can go now.
    fn begin_attempt<T: Transport, S: SceneLoader>(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        if self.attempts > 0 {
            self.phase = Phase::BetweenAttempts {
                deadline: ctx.now() + ctx.config.time_between_attempts,
            };
            return None;
        }
        self.shut_down_transport(ctx)
    }

    fn shut_down_transport<T: Transport, S: SceneLoader>(
        &mut self,
        ctx: &mut ConnectionContext<T, S>,
    ) -> Transition {
        info!("Lost connection to host, trying to reconnect...");
        ctx.transport.shutdown();
        self.phase = Phase::ShuttingDown;
        self.advance(ctx)
    }

    fn advance<T: Transport, S: SceneLoader>(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        match self.phase {
            Phase::Idle => None,
            Phase::BetweenAttempts { deadline } => {
                if ctx.now() >= deadline {
                    self.shut_down_transport(ctx)
                } else {
                    None
                }
            }
            Phase::ShuttingDown => {
                if ctx.transport.is_shutdown_in_progress() {
                    return None;
                }
                let max = ctx.config.reconnect_attempts;
                info!("Reconnecting attempt {}/{}...", self.attempts + 1, max);
                ctx.notify(ConnectionNotice::Reconnecting {
                    attempt: self.attempts,
                    max,
                });
                if self.attempts == 0 {
                    self.phase = Phase::BeforeFirstAttempt {
                        deadline: ctx.now() + ctx.config.time_before_first_attempt,
                    };
                    None
                } else {
                    self.attempt(ctx)
                }
            }
            Phase::BeforeFirstAttempt { deadline } => {
                if ctx.now() >= deadline {
                    self.attempt(ctx)
                } else {
                    None
                }
            }
        }
    }

    fn attempt<T: Transport, S: SceneLoader>(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        self.phase = Phase::Idle;
        self.attempts += 1;

        let setup = match ctx.with_method(|method, _| method.setup_client_reconnection()) {
            Ok(setup) => setup,
            Err(e) => {
                ctx.fail(e);
                return starting_client_failed(ctx);
            }
        };

        if setup.success {
            connect_client(ctx)
        } else {
            if !setup.should_try_again {
                debug!("Connection method gave up on reconnecting");
                self.attempts = ctx.config.reconnect_attempts;
            }
            self.handle_disconnect(ctx)
        }
    }

    fn handle_disconnect<T: Transport, S: SceneLoader>(
        &mut self,
        ctx: &mut ConnectionContext<T, S>,
    ) -> Transition {
        let reason = ctx.transport.disconnect_reason();
        if self.attempts < ctx.config.reconnect_attempts {
            match reason {
                None => self.begin_attempt(ctx),
                Some(status) => {
                    ctx.publish(status);
                    if status.is_terminal() {
                        Some(ConnectionStateKind::Offline)
                    } else {
                        self.begin_attempt(ctx)
                    }
                }
            }
        } else {
            ctx.publish(reason.unwrap_or(ConnectStatus::GenericDisconnect));
            Some(ConnectionStateKind::Offline)
        }
    }
}

impl<T: Transport, S: SceneLoader> ConnectionState<T, S> for ClientReconnectingState {
    fn enter(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        self.attempts = 0;
        self.phase = Phase::Idle;
        self.begin_attempt(ctx)
    }

    fn exit(&mut self, ctx: &mut ConnectionContext<T, S>) {
        self.phase = Phase::Idle;
        let max = ctx.config.reconnect_attempts;
        ctx.notify(ConnectionNotice::Reconnecting { attempt: max, max });
    }

    fn tick(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        self.advance(ctx)
    }

    fn on_client_connected(&mut self, _ctx: &mut ConnectionContext<T, S>, _client_id: ClientId) -> Transition {
        Some(ConnectionStateKind::ClientConnected)
    }

    fn on_client_disconnected(&mut self, ctx: &mut ConnectionContext<T, S>, _client_id: ClientId) -> Transition {
        self.handle_disconnect(ctx)
    }

    fn on_transport_failure(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        self.handle_disconnect(ctx)
    }

    fn on_user_requested_shutdown(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::UserRequestedDisconnect);
        Some(ConnectionStateKind::Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::{FakeMethod, FakeScenes, FakeTransport};
    use super::super::{ConnectionConfig, ConnectionManager, ConnectionNotice, ConnectionStateKind};
    use crate::protocol::ConnectStatus;

    type Manager = ConnectionManager<FakeTransport, FakeScenes>;

    /// A client that connected at t=0 and just lost the host without a reason.
    fn lost_connection() -> Manager {
        let mut connection = Manager::new(
            FakeTransport::default(),
            FakeScenes::at_main_menu(),
            ConnectionConfig::default(),
        );
        connection
            .start_client_ip("p1", "Ada", "127.0.0.1", 9000)
            .unwrap();
        connection.on_client_connected(1);
        connection.on_client_disconnected(1);
        connection
    }

    #[test]
    fn test_first_attempt_waits_short_delay() {
        let mut connection = lost_connection();
        assert_eq!(connection.state(), ConnectionStateKind::ClientReconnecting);
        assert_eq!(connection.transport().client_starts, 1);

        connection.tick(0.5);
        assert_eq!(connection.transport().client_starts, 1);

        connection.tick(1.0);
        assert_eq!(connection.transport().client_starts, 2);
    }

    #[test]
    fn test_reconnection_succeeds() {
        let mut connection = lost_connection();
        connection.tick(1.0);
        connection.drain_notices();

        connection.on_client_connected(2);

        assert_eq!(connection.state(), ConnectionStateKind::ClientConnected);
        assert_eq!(
            connection.drain_notices(),
            vec![ConnectionNotice::Reconnecting { attempt: 2, max: 2 }]
        );
    }

    #[test]
    fn test_gives_up_after_exact_attempt_budget() {
        let mut connection = lost_connection();
        connection.tick(1.0);

        // first attempt fails, one left
        connection.on_client_disconnected(1);
        assert_eq!(connection.state(), ConnectionStateKind::ClientReconnecting);
        assert_eq!(connection.transport().client_starts, 2);

        // the retry is delayed, not immediate
        connection.tick(3.0);
        assert_eq!(connection.transport().client_starts, 2);
        connection.tick(6.0);
        assert_eq!(connection.transport().client_starts, 3);

        connection.drain_notices();
        connection.on_client_disconnected(1);

        assert_eq!(connection.state(), ConnectionStateKind::Offline);
        let notices = connection.drain_notices();
        assert!(notices.contains(&ConnectionNotice::Status(ConnectStatus::GenericDisconnect)));
    }

    #[test]
    fn test_terminal_reason_stops_retrying() {
        let mut connection = lost_connection();
        connection.tick(1.0);
        connection.transport_mut().reason = Some(ConnectStatus::ServerFull);

        connection.on_client_disconnected(1);

        assert_eq!(connection.state(), ConnectionStateKind::Offline);
        assert_eq!(connection.transport().client_starts, 2);
    }

    #[test]
    fn test_non_terminal_reason_keeps_retrying() {
        let mut connection = lost_connection();
        connection.tick(1.0);
        connection.transport_mut().reason = Some(ConnectStatus::GenericDisconnect);

        connection.on_client_disconnected(1);

        assert_eq!(connection.state(), ConnectionStateKind::ClientReconnecting);
    }

    #[test]
    fn test_waits_for_transport_shutdown() {
        let mut connection = lost_connection();
        connection.tick(1.0);
        connection.on_client_disconnected(1);
        connection.transport_mut().shutdown_polls.set(1);

        connection.tick(6.0);
        assert_eq!(connection.transport().client_starts, 2);

        connection.tick(6.1);
        assert_eq!(connection.transport().client_starts, 3);
    }

    #[test]
    fn test_method_refusing_to_retry_ends_reconnection() {
        let mut connection = Manager::new(
            FakeTransport::default(),
            FakeScenes::at_main_menu(),
            ConnectionConfig::default(),
        );
        connection
            .start_client(Box::new(FakeMethod::reconnection(false, false)))
            .unwrap();
        connection.on_client_connected(1);
        connection.on_client_disconnected(1);

        connection.tick(1.0);

        assert_eq!(connection.state(), ConnectionStateKind::Offline);
    }
}
