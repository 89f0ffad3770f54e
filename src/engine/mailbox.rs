//! Per-symbol serialization. Every mutating operation for a coin symbol is
//! funneled through that symbol's mailbox and executed by a single worker
//! task, so open/close/update for one symbol never interleave. Different
//! symbols run concurrently.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

const MAILBOX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("mailbox for {0} is closed")]
    Closed(String),

    #[error("worker for {0} dropped the reply")]
    ReplyDropped(String),
}

#[derive(Default)]
pub struct SymbolMailboxes {
    senders: Mutex<HashMap<String, mpsc::Sender<Job>>>,
}

impl SymbolMailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a job on the symbol's serial worker and await its result.
    pub async fn run<T, F, Fut>(&self, coin_symbol: &str, make_job: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let _ = reply_tx.send(make_job().await);
            })
        });

        let sender = self.sender_for(coin_symbol).await;
        sender
            .send(job)
            .await
            .map_err(|_| MailboxError::Closed(coin_symbol.to_string()))?;
        reply_rx
            .await
            .map_err(|_| MailboxError::ReplyDropped(coin_symbol.to_string()))
    }

    async fn sender_for(&self, coin_symbol: &str) -> mpsc::Sender<Job> {
        let mut senders = self.senders.lock().await;
        if let Some(sender) = senders.get(coin_symbol) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let (tx, mut rx) = mpsc::channel::<Job>(MAILBOX_DEPTH);
        let symbol = coin_symbol.to_string();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job().await;
            }
            tracing::debug!(symbol = %symbol, "Symbol mailbox drained");
        });
        senders.insert(coin_symbol.to_string(), tx.clone());
        tx
    }
}
