use std::pin::Pin;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use log::{debug, trace};
use tokio::{
    select,
    sync::mpsc,
    time::{sleep, Duration, Instant},
};
use uuid::Uuid;

use crate::access::Access;
use crate::actors::hub::{HubHandle, HubMessage};
use crate::actors::supervisor::{ExitCallback, Supervisor};
use crate::error::ScribaError;
use crate::protocol::*;
use crate::store::DocumentStore;

// Period after which the client is considered inactive and will be disconnected
// (Client should send heartbeat messages every 30 seconds)
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Disconnect deadline of a session, pushed back by every heartbeat.
pub struct Liveness {
    deadline: Pin<Box<tokio::time::Sleep>>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            deadline: Box::pin(sleep(DISCONNECT_TIMEOUT)),
        }
    }

    pub fn reset(&mut self) {
        self.deadline
            .as_mut()
            .reset(Instant::now() + DISCONNECT_TIMEOUT);
    }

    /// Resolves once no heartbeat arrived for `DISCONNECT_TIMEOUT`.
    pub fn expired(&mut self) -> &mut Pin<Box<tokio::time::Sleep>> {
        &mut self.deadline
    }
}

pub fn heartbeat_reply(msg: HeartbeatMessage) -> HeartbeatMessage {
    HeartbeatMessage {
        i: msg.i.wrapping_add(1),
    }
}

/// Checks that `user` may edit the document and hands the operations to the
/// hub, addressed to the sessions of the owner and the collaborators.
pub async fn forward_operations(
    documents: &dyn DocumentStore,
    hub: &HubHandle,
    client_id: i32,
    user: Uuid,
    msg: OperationsMessage,
) -> Result<(), ScribaError> {
    let Some(doc) = documents.find_by_id(msg.doc).await? else {
        return Err(ScribaError::not_found("Document not found"));
    };
    if Access::of(&doc, user) == Access::Unauthorized {
        debug!("client-{}: {} may not edit {}", client_id, user, doc.id);
        return Err(ScribaError::forbidden(
            "You don't have access to this document",
        ));
    }
    trace!("client-{}: operations on {}", client_id, doc.id);
    let mut audience = doc.collaborators.clone();
    audience.push(doc.owner);
    let msg = ServerMessage::RemoteOperations(RemoteOperationsMessage {
        doc: doc.id,
        user,
        ops: msg.ops,
    });
    hub.send(HubMessage::Relay {
        from: client_id,
        audience,
        msg,
    });
    Ok(())
}

// Client actor owns one websocket session. It forwards events published by
// the hub to the socket and relays document operations from the socket to
// the hub after checking that the session user may edit the document.

pub enum ClientActorMessage {
    /// Already serialized server message.
    Raw(String),
}

struct ClientActor {
    supervisor: Supervisor,
    client_id: i32,
    user: Uuid,
    websocket: WebSocket,
    receiver: mpsc::UnboundedReceiver<ClientActorMessage>,
    documents: Arc<dyn DocumentStore>,
    hub: HubHandle,
    liveness: Liveness,
}

impl ClientActor {
    async fn run(&mut self) {
        trace!("client-{}: start, user: {}", self.client_id, self.user);
        loop {
            select! {
                _ = self.liveness.expired() => {
                    trace!("client-{}: disconnect by timeout", self.client_id);
                    break
                },
                Some(msg) = self.receiver.recv() => {
                    match msg {
                        ClientActorMessage::Raw(msg) => {
                            self.send_to_ws_raw(msg).await;
                        }
                    };
                },
                msg = self.websocket.recv() => {
                    match msg {
                        Some(Ok(msg)) => self.handle_message(msg).await,
                        _ => break
                    }
                },
            }
        }
    }

    async fn handle_message(&mut self, msg: Message) {
        let Message::Text(str) = msg else {
            // unsupported message type
            return;
        };
        let Ok(deserialized) = serde_json::from_str::<ClientMessage>(&str)
        else {
            debug!("client-{}: unreadable message", self.client_id);
            self.send_error(ScribaError::bad_request("Invalid message"))
                .await;
            return;
        };
        match deserialized {
            ClientMessage::Heartbeat(msg) => self.handle_heartbeat(msg).await,
            ClientMessage::Operations(msg) => {
                self.handle_operations(msg).await
            }
        };
    }

    async fn handle_heartbeat(&mut self, msg: HeartbeatMessage) {
        self.liveness.reset();
        let reply = heartbeat_reply(msg);
        self.send_to_ws(ServerMessage::Heartbeat(reply)).await;
    }

    async fn handle_operations(&mut self, msg: OperationsMessage) {
        let res = forward_operations(
            self.documents.as_ref(),
            &self.hub,
            self.client_id,
            self.user,
            msg,
        )
        .await;
        if let Err(err) = res {
            self.send_error(err).await;
        }
    }

    async fn send_error(&mut self, err: ScribaError) {
        let msg = ServerMessage::Error(ErrorMessage {
            code: err.code,
            message: err.message,
        });
        self.send_to_ws(msg).await;
    }

    async fn send_to_ws(&mut self, msg: ServerMessage) {
        if let Ok(encoded) = serde_json::to_string(&msg) {
            self.send_to_ws_raw(encoded).await;
        }
    }

    async fn send_to_ws_raw(&mut self, msg: String) {
        let res = self.websocket.send(Message::Text(msg)).await;
        if res.is_err() {
            self.supervisor.stop();
            return;
        }
        trace!("client-{}: sent message to websocket", self.client_id);
    }
}

#[derive(Clone)]
pub struct ClientHandle {
    sender: mpsc::UnboundedSender<ClientActorMessage>,
}

impl ClientHandle {
    pub fn new(
        client_id: i32,
        user: Uuid,
        websocket: WebSocket,
        documents: Arc<dyn DocumentStore>,
        hub: HubHandle,
        on_exit: Option<ExitCallback>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new();
        let mut actor = ClientActor {
            supervisor: supervisor.clone(),
            client_id,
            user,
            websocket,
            receiver,
            documents,
            hub,
            liveness: Liveness::new(),
        };
        supervisor.spawn(
            format!("client-{}", client_id),
            async move { actor.run().await },
            on_exit,
        );
        Self { sender }
    }

    /// Handle that is not backed by a socket, for observing what a session
    /// would receive.
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<ClientActorMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn send(&self, msg: ClientActorMessage) {
        _ = self.sender.send(msg);
    }
}
