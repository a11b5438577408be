use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocket;
use log::trace;
use tokio::select;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::actors::client::{ClientActorMessage, ClientHandle};
use crate::actors::supervisor::ExitCallback;
use crate::actors::FanOut;
use crate::protocol::ServerMessage;
use crate::store::DocumentStore;

// Hub actor owns the registry of connected sessions and delivers published
// events to them. Delivery is at most once, sessions that are not connected
// when an event is published never see it.

pub enum HubMessage {
    Connect { websocket: WebSocket, user: Uuid },
    Broadcast(ServerMessage),
    /// Message originating from a session. Delivered to the other sessions
    /// whose user is in `audience`.
    Relay {
        from: i32,
        audience: Vec<Uuid>,
        msg: ServerMessage,
    },
}

struct Session {
    user: Uuid,
    client: ClientHandle,
}

struct HubActor {
    receiver: mpsc::UnboundedReceiver<HubMessage>,
    handle: HubHandle,
    documents: Arc<dyn DocumentStore>,
    client_id: i32,
    clients: HashMap<i32, Session>,
    exit_channel: (mpsc::UnboundedSender<i32>, mpsc::UnboundedReceiver<i32>),
}

impl HubActor {
    fn new(
        receiver: mpsc::UnboundedReceiver<HubMessage>,
        handle: HubHandle,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            receiver,
            handle,
            documents,
            client_id: 0,
            clients: HashMap::new(),
            exit_channel: mpsc::unbounded_channel(),
        }
    }

    async fn run(&mut self) {
        trace!("hub: actor start");
        loop {
            select! {
                msg = self.receiver.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg),
                        None => break
                    }
                },
                Some(id) = self.exit_channel.1.recv() => {
                    trace!("client-{}: exit", id);
                    self.clients.remove(&id);
                },
            }
        }
        trace!("hub: actor exit");
    }

    fn handle_message(&mut self, msg: HubMessage) {
        match msg {
            HubMessage::Connect { websocket, user } => {
                self.handle_connect(websocket, user);
            }
            HubMessage::Broadcast(msg) => self.broadcast(&msg, |_, _| true),
            HubMessage::Relay {
                from,
                audience,
                msg,
            } => self.broadcast(&msg, |id, session| {
                id != from && audience.contains(&session.user)
            }),
        }
    }

    fn handle_connect(&mut self, websocket: WebSocket, user: Uuid) {
        let client_id = self.get_client_id();
        let on_exit: ExitCallback = {
            let exit_sender = self.exit_channel.0.clone();
            Box::new(move || {
                _ = exit_sender.send(client_id);
            })
        };
        let client = ClientHandle::new(
            client_id,
            user,
            websocket,
            self.documents.clone(),
            self.handle.clone(),
            Some(on_exit),
        );
        self.clients.insert(client_id, Session { user, client });
        trace!("hub: client-{} connected, user: {}", client_id, user);
    }

    fn get_client_id(&mut self) -> i32 {
        self.client_id += 1;
        self.client_id
    }

    fn broadcast<F>(&self, msg: &ServerMessage, to: F)
    where
        F: Fn(i32, &Session) -> bool,
    {
        let Ok(encoded) = serde_json::to_string(msg) else {
            return;
        };
        let mut sent = 0;
        for (id, session) in self.clients.iter() {
            if to(*id, session) {
                session.client.send(ClientActorMessage::Raw(encoded.clone()));
                sent += 1;
            }
        }
        trace!("hub: broadcast to {} clients", sent);
    }
}

#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::UnboundedSender<HubMessage>,
}

impl HubHandle {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self { sender };
        let mut actor = HubActor::new(receiver, handle.clone(), documents);
        tokio::spawn(async move { actor.run().await });
        handle
    }

    /// Handle without an actor behind it, for observing what the hub would
    /// receive.
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<HubMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn send(&self, msg: HubMessage) {
        _ = self.sender.send(msg);
    }
}

impl FanOut for HubHandle {
    fn broadcast(&self, msg: ServerMessage) {
        self.send(HubMessage::Broadcast(msg));
    }
}
