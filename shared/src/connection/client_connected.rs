use super::{ConnectionContext, ConnectionState, ConnectionStateKind, SceneLoader, Transition, Transport};
use crate::protocol::ConnectStatus;
use crate::session::ClientId;
use log::info;

/// Connected and playing.
#[derive(Debug, Default)]
pub(crate) struct ClientConnectedState;

impl<T: Transport, S: SceneLoader> ConnectionState<T, S> for ClientConnectedState {
    fn enter(&mut self, _ctx: &mut ConnectionContext<T, S>) -> Transition {
        None
    }

    /// A disconnect without a reason is worth retrying; an explicit reason
    /// is final.
    fn on_client_disconnected(&mut self, ctx: &mut ConnectionContext<T, S>, _client_id: ClientId) -> Transition {
        match ctx.transport.disconnect_reason() {
            None => {
                ctx.publish(ConnectStatus::Reconnecting);
                Some(ConnectionStateKind::ClientReconnecting)
            }
            Some(status) => {
                info!("Disconnected by host: {}", status);
                ctx.publish(status);
                Some(ConnectionStateKind::Offline)
            }
        }
    }

    fn on_transport_failure(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::Reconnecting);
        Some(ConnectionStateKind::ClientReconnecting)
    }

    fn on_user_requested_shutdown(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::UserRequestedDisconnect);
        Some(ConnectionStateKind::Offline)
    }
}
