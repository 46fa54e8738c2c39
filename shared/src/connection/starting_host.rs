use super::{
    ApprovalRequest, ApprovalResponse, ConnectionContext, ConnectionError, ConnectionState,
    ConnectionStateKind, SceneLoader, Transition, Transport,
};
use crate::protocol::{ConnectStatus, ConnectionPayload};
use crate::session::PlayerSessionData;
use log::{error, warn};

/// Host transport starting; only the host's own client may connect.
#[derive(Debug, Default)]
pub(crate) struct StartingHostState;

impl StartingHostState {
    fn start_host_failed<T: Transport, S: SceneLoader>(ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::StartHostFailed);
        Some(ConnectionStateKind::Offline)
    }
}

impl<T: Transport, S: SceneLoader> ConnectionState<T, S> for StartingHostState {
    fn enter(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        let result = ctx
            .with_method(|method, transport| method.setup_host_connection(transport))
            .and_then(|setup| setup)
            .and_then(|()| {
                if ctx.transport.start_host() {
                    Ok(())
                } else {
                    Err(ConnectionError::StartHostFailed)
                }
            });

        if let Err(e) = result {
            error!("Error starting host: {}", e);
            let next = Self::start_host_failed(ctx);
            ctx.fail(e);
            return next;
        }

        // the host's own client goes through approval like everyone else
        let request = ApprovalRequest {
            client_id: ctx.transport.local_client_id(),
            payload: ctx.transport.connection_data().to_vec(),
        };
        if !self.approval_check(ctx, &request).approved {
            warn!("Host could not approve its own connection");
        }
        None
    }

    fn on_server_started(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::Success);
        Some(ConnectionStateKind::Hosting)
    }

    fn on_server_stopped(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        Self::start_host_failed(ctx)
    }

    fn on_transport_failure(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        Self::start_host_failed(ctx)
    }

    fn approval_check(
        &mut self,
        ctx: &mut ConnectionContext<T, S>,
        request: &ApprovalRequest,
    ) -> ApprovalResponse {
        if request.client_id != ctx.transport.local_client_id() {
            return ApprovalResponse::denied(None);
        }
        match ConnectionPayload::decode(&request.payload) {
            Ok(payload) => {
                ctx.sessions.setup_connecting_player_session_data(
                    request.client_id,
                    &payload.player_id,
                    PlayerSessionData::new(request.client_id, &payload.player_name),
                );
                ApprovalResponse::approved()
            }
            Err(e) => {
                warn!("Host connection payload rejected: {}", e);
                ApprovalResponse::denied(None)
            }
        }
    }
}
