use super::{
    ApprovalRequest, ApprovalResponse, ConnectionContext, ConnectionNotice, ConnectionState,
    ConnectionStateKind, SceneLoader, Transition, Transport, CHAR_SELECT_SCENE,
};
use crate::protocol::{ConnectStatus, ConnectionPayload};
use crate::session::{ClientId, PlayerSessionData};
use log::{debug, error, warn};

/// Host up and accepting players.
#[derive(Debug, Default)]
pub(crate) struct HostingState;

impl HostingState {
    /// First failing check wins.
    fn connect_status<T: Transport, S: SceneLoader>(
        ctx: &ConnectionContext<T, S>,
        payload: &ConnectionPayload,
    ) -> ConnectStatus {
        if ctx.transport.connected_client_ids().len() >= ctx.config.max_connected_players {
            return ConnectStatus::ServerFull;
        }
        if payload.is_debug != ctx.config.is_debug_build {
            return ConnectStatus::IncompatibleBuildType;
        }
        if ctx.sessions.is_duplicate_connection(&payload.player_id) {
            return ConnectStatus::LoggedInAgain;
        }
        ConnectStatus::Success
    }
}

impl<T: Transport, S: SceneLoader> ConnectionState<T, S> for HostingState {
    fn enter(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.scenes.load_scene(CHAR_SELECT_SCENE, true);
        None
    }

    fn exit(&mut self, ctx: &mut ConnectionContext<T, S>) {
        ctx.sessions.on_server_ended();
    }

    fn on_client_connected(&mut self, ctx: &mut ConnectionContext<T, S>, client_id: ClientId) -> Transition {
        match ctx.sessions.player_data(client_id) {
            Some(data) => {
                let player_name = data.player_name.clone();
                ctx.notify(ConnectionNotice::PlayerEvent {
                    status: ConnectStatus::Success,
                    player_name,
                });
            }
            None => {
                // approval always registers session data first
                error!("No player data associated with client {}", client_id);
                ctx.transport
                    .disconnect_client(client_id, ConnectStatus::GenericDisconnect);
            }
        }
        None
    }

    fn on_client_disconnected(&mut self, ctx: &mut ConnectionContext<T, S>, client_id: ClientId) -> Transition {
        if client_id == ctx.transport.local_client_id() {
            return None;
        }
        if ctx.sessions.player_id(client_id).is_some() {
            if let Some(data) = ctx.sessions.player_data(client_id) {
                let player_name = data.player_name.clone();
                ctx.notify(ConnectionNotice::PlayerEvent {
                    status: ConnectStatus::GenericDisconnect,
                    player_name,
                });
            }
            ctx.sessions.disconnect_client(client_id);
        }
        None
    }

    fn on_user_requested_shutdown(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        let local = ctx.transport.local_client_id();
        for client_id in ctx.transport.connected_client_ids().into_iter().rev() {
            if client_id != local {
                ctx.transport
                    .disconnect_client(client_id, ConnectStatus::HostEndedSession);
            }
        }
        Some(ConnectionStateKind::Offline)
    }

    fn on_server_stopped(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::GenericDisconnect);
        Some(ConnectionStateKind::Offline)
    }

    fn on_transport_failure(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.publish(ConnectStatus::GenericDisconnect);
        Some(ConnectionStateKind::Offline)
    }

    fn approval_check(
        &mut self,
        ctx: &mut ConnectionContext<T, S>,
        request: &ApprovalRequest,
    ) -> ApprovalResponse {
        // oversized payloads are refused unread
        if request.payload.len() > ctx.config.max_connect_payload {
            debug!(
                "Refusing client {}: {} byte payload",
                request.client_id,
                request.payload.len()
            );
            return ApprovalResponse::denied(None);
        }

        let payload = match ConnectionPayload::decode(&request.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Refusing client {}: {}", request.client_id, e);
                return ApprovalResponse::denied(None);
            }
        };

        let status = Self::connect_status(ctx, &payload);
        if status != ConnectStatus::Success {
            debug!("Refusing client {}: {}", request.client_id, status);
            return ApprovalResponse::denied(Some(status));
        }

        ctx.sessions.setup_connecting_player_session_data(
            request.client_id,
            &payload.player_id,
            PlayerSessionData::new(request.client_id, &payload.player_name),
        );
        ApprovalResponse::approved()
    }
}
