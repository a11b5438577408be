use std::sync::Arc;

use log::trace;
use tokio::select;
use tokio::sync::Notify;

/// Stop signal shared between an actor task and its handles.
#[derive(Clone)]
pub struct Supervisor {
    stop: Arc<Notify>,
}

pub type ExitCallback = Box<dyn FnOnce() + Send>;

impl Supervisor {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(Notify::new()),
        }
    }

    /// Runs `task` until it completes or `stop` is called, then invokes
    /// `on_exit` exactly once.
    pub fn spawn<T>(&self, name: String, task: T, on_exit: Option<ExitCallback>)
    where
        T: std::future::Future + Send + 'static,
    {
        let stop = self.stop.clone();
        tokio::task::spawn(async move {
            select! {
                _ = task => trace!("{}: task finished", name),
                () = stop.notified() => trace!("{}: stopped", name),
            }
            if let Some(on_exit) = on_exit {
                on_exit();
            }
        });
    }

    pub fn stop(&self) {
        self.stop.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn exit_callback_runs_after_stop() {
        let supervisor = Supervisor::new();
        let (sender, receiver) = oneshot::channel();
        supervisor.spawn(
            "test".to_string(),
            std::future::pending::<()>(),
            Some(Box::new(move || {
                _ = sender.send(());
            })),
        );
        tokio::task::yield_now().await;
        supervisor.stop();
        assert!(receiver.await.is_ok());
    }
}
