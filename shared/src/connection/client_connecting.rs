use super::{
    ConnectionContext, ConnectionError, ConnectionState, ConnectionStateKind, SceneLoader,
    Transition, Transport,
};
use crate::protocol::ConnectStatus;
use crate::session::ClientId;
use log::error;

/// Waiting for the host to accept the connection.
#[derive(Debug, Default)]
pub(crate) struct ClientConnectingState;

impl<T: Transport, S: SceneLoader> ConnectionState<T, S> for ClientConnectingState {
    fn enter(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        connect_client(ctx)
    }

    fn on_client_connected(&mut self, ctx: &mut ConnectionContext<T, S>, _client_id: ClientId) -> Transition {
        ctx.publish(ConnectStatus::Success);
        Some(ConnectionStateKind::ClientConnected)
    }

    fn on_client_disconnected(&mut self, ctx: &mut ConnectionContext<T, S>, _client_id: ClientId) -> Transition {
        starting_client_failed(ctx)
    }

    fn on_transport_failure(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        starting_client_failed(ctx)
    }

    fn on_user_requested_shutdown(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::UserRequestedDisconnect);
        Some(ConnectionStateKind::Offline)
    }
}

/// Runs the connection method's client setup and starts the transport.
/// On failure the status is published, the error kept for the caller, and
/// the machine heads back to `Offline`.
pub(super) fn connect_client<T: Transport, S: SceneLoader>(
    ctx: &mut ConnectionContext<T, S>,
) -> Transition {
    let result = ctx
        .with_method(|method, transport| method.setup_client_connection(transport))
        .and_then(|setup| setup)
        .and_then(|()| {
            if ctx.transport.start_client() {
                Ok(())
            } else {
                Err(ConnectionError::StartClientFailed)
            }
        });

    match result {
        Ok(()) => None,
        Err(e) => {
            error!("Error connecting client: {}", e);
            let next = starting_client_failed(ctx);
            ctx.fail(e);
            next
        }
    }
}

/// Publishes the host's stated reason, or a generic start failure.
pub(super) fn starting_client_failed<T: Transport, S: SceneLoader>(
    ctx: &mut ConnectionContext<T, S>,
) -> Transition {
    let status = ctx
        .transport
        .disconnect_reason()
        .unwrap_or(ConnectStatus::StartClientFailed);
    ctx.publish(status);
    Some(ConnectionStateKind::Offline)
}
