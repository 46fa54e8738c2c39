use super::{
    ConnectionContext, ConnectionMethod, ConnectionState, ConnectionStateKind, SceneLoader,
    Transition, Transport, MAIN_MENU_SCENE,
};

/// Nothing running; waiting for the user to host or join.
#[derive(Debug, Default)]
pub(crate) struct OfflineState;

impl<T: Transport, S: SceneLoader> ConnectionState<T, S> for OfflineState {
    fn enter(&mut self, ctx: &mut ConnectionContext<T, S>) -> Transition {
        ctx.transport.shutdown();
        if ctx.scenes.active_scene() != MAIN_MENU_SCENE {
            ctx.scenes.load_scene(MAIN_MENU_SCENE, false);
        }
        None
    }

    fn start_client(
        &mut self,
        ctx: &mut ConnectionContext<T, S>,
        method: Box<dyn ConnectionMethod>,
    ) -> Transition {
        // connecting and reconnecting share the method
        ctx.method = Some(method);
        Some(ConnectionStateKind::ClientConnecting)
    }

    fn start_host(
        &mut self,
        ctx: &mut ConnectionContext<T, S>,
        method: Box<dyn ConnectionMethod>,
    ) -> Transition {
        ctx.method = Some(method);
        Some(ConnectionStateKind::StartingHost)
    }
}
