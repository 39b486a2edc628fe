//! Long-lived actor owning the [`TransactionStore`]. The SIP layer and
//! transaction workers talk to it through a mailbox, which serializes
//! every registry operation; the store itself is never shared.

use std::time::Duration;

use async_channel::{Receiver, Sender};
use tracing::{debug, info};

use crate::message::{Message, Method};
use crate::transaction::{TransactionState, TransactionStore};
use crate::worker::WorkerHandle;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub enum Command {
    AddClientTransaction {
        method: Method,
        branch: String,
        worker: WorkerHandle,
    },
    AddServerTransaction {
        request: Box<Message>,
        worker: WorkerHandle,
    },
    MatchRequest {
        request: Box<Message>,
        reply: Sender<Option<TransactionState>>,
    },
    MatchResponse {
        response: Box<Message>,
        reply: Sender<Option<TransactionState>>,
    },
    SetWorker {
        token: u64,
        worker: Option<WorkerHandle>,
    },
    SetAppdata {
        token: u64,
        appdata: Option<serde_json::Value>,
    },
    SetResponseToTag {
        token: u64,
        tag: Option<String>,
    },
    AppendResponseBranch {
        token: u64,
        branch: String,
        method: Method,
    },
    /// A worker terminated; drop everything it was driving.
    WorkerDied { worker: WorkerHandle },
    DebugFormat { reply: Sender<String> },
}

#[derive(Clone)]
pub struct Dispatcher {
    sender: Sender<Command>,
}

impl Dispatcher {
    pub fn start() -> Dispatcher {
        let (sender, receiver) = async_channel::unbounded();
        tokio::spawn(async move {
            run(receiver).await;
        });
        Dispatcher { sender }
    }

    pub async fn send(&self, command: Command) {
        let _ = self.sender.send(command).await;
    }

    /// Match an inbound request to its server transaction; `None` means
    /// the SIP layer should start a new one.
    pub async fn match_request(&self, request: Message) -> Option<TransactionState> {
        let (reply, answer) = async_channel::bounded(1);
        self.send(Command::MatchRequest {
            request: Box::new(request),
            reply,
        })
        .await;
        answer.recv().await.ok().flatten()
    }

    pub async fn match_response(&self, response: Message) -> Option<TransactionState> {
        let (reply, answer) = async_channel::bounded(1);
        self.send(Command::MatchResponse {
            response: Box::new(response),
            reply,
        })
        .await;
        answer.recv().await.ok().flatten()
    }

    pub async fn debug_format(&self) -> String {
        let (reply, answer) = async_channel::bounded(1);
        self.send(Command::DebugFormat { reply }).await;
        answer.recv().await.unwrap_or_default()
    }
}

async fn run(receiver: Receiver<Command>) {
    let mut store = TransactionStore::new();
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    info!("transaction dispatcher started");

    loop {
        tokio::select! {
            command = receiver.recv() => {
                let Ok(command) = command else {
                    info!("transaction dispatcher mailbox closed, stopping");
                    return;
                };
                handle(&mut store, command);
            }
            _ = sweep.tick() => {
                let dropped = store.delete_expired();
                if dropped > 0 {
                    debug!(dropped, remaining = store.len(), "expiry sweep");
                }
            }
        }
    }
}

fn handle(store: &mut TransactionStore, command: Command) {
    match command {
        Command::AddClientTransaction {
            method,
            branch,
            worker,
        } => {
            store.add_client_transaction(method, branch, worker);
        }
        Command::AddServerTransaction { request, worker } => {
            store.add_server_transaction(&request, worker);
        }
        Command::MatchRequest { request, reply } => {
            let record = store
                .get_server_transaction_using_request(&request)
                .ok()
                .flatten()
                .cloned();
            let _ = reply.try_send(record);
        }
        Command::MatchResponse { response, reply } => {
            let record = if response.is_request() {
                None
            } else {
                store
                    .get_client_transaction(
                        &response.cseq.method,
                        response
                            .via
                            .first()
                            .map(|via| via.branch.as_str())
                            .unwrap_or(""),
                    )
                    .cloned()
                    .or_else(|| {
                        store
                            .get_server_transaction_using_response(&response)
                            .ok()
                            .flatten()
                            .cloned()
                    })
            };
            let _ = reply.try_send(record);
        }
        Command::SetWorker { token, worker } => store.set_worker(token, worker),
        Command::SetAppdata { token, appdata } => store.set_appdata(token, appdata),
        Command::SetResponseToTag { token, tag } => {
            store.set_response_to_tag(token, tag)
        }
        Command::AppendResponseBranch {
            token,
            branch,
            method,
        } => store.append_response_branch(token, branch, method),
        Command::WorkerDied { worker } => {
            let dropped = store.delete_by_worker(&worker);
            debug!(%worker, dropped, "worker died");
        }
        Command::DebugFormat { reply } => {
            let _ = reply.try_send(store.debug_format());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Address, Cseq, Uri, Via};
    use crate::worker::Worker;
    use std::str::FromStr;

    fn invite(branch: &str) -> Message {
        Message {
            method: Some(Method::INVITE),
            request_uri: Some(Uri::from_str("sip:bob@example.org").unwrap()),
            via: vec![Via {
                host: "client.example.org".to_string(),
                branch: branch.to_string(),
                ..Default::default()
            }],
            from: Address {
                tag: Some("f-tag".to_string()),
                ..Default::default()
            },
            callid: "dispatch-call".to_string(),
            cseq: Cseq {
                seq: 1,
                method: Method::INVITE,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_then_match_request() {
        let dispatcher = Dispatcher::start();
        let worker = Worker::new();
        let request = invite("z9hG4bK.disp");

        dispatcher
            .send(Command::AddServerTransaction {
                request: Box::new(request.clone()),
                worker: worker.handle.clone(),
            })
            .await;

        let record = dispatcher.match_request(request).await.unwrap();
        assert_eq!(record.worker.as_ref(), Some(&worker.handle));
    }

    #[tokio::test]
    async fn worker_death_drops_its_transactions() {
        let dispatcher = Dispatcher::start();
        let worker = Worker::new();
        let request = invite("z9hG4bK.dead");

        dispatcher
            .send(Command::AddServerTransaction {
                request: Box::new(request.clone()),
                worker: worker.handle.clone(),
            })
            .await;
        dispatcher
            .send(Command::WorkerDied {
                worker: worker.handle.clone(),
            })
            .await;

        assert!(dispatcher.match_request(request).await.is_none());
    }

    #[tokio::test]
    async fn match_response_finds_client_transaction() {
        let dispatcher = Dispatcher::start();
        let worker = Worker::new();

        dispatcher
            .send(Command::AddClientTransaction {
                method: Method::INVITE,
                branch: "z9hG4bK.cli".to_string(),
                worker: worker.handle.clone(),
            })
            .await;

        let response = Message {
            code: Some(180),
            via: vec![Via {
                host: "proxy.example.org".to_string(),
                branch: "z9hG4bK.cli".to_string(),
                ..Default::default()
            }],
            cseq: Cseq {
                seq: 1,
                method: Method::INVITE,
            },
            ..Default::default()
        };
        assert!(dispatcher.match_response(response).await.is_some());
    }

    #[tokio::test]
    async fn debug_format_snapshot() {
        let dispatcher = Dispatcher::start();
        let worker = Worker::new();
        dispatcher
            .send(Command::AddClientTransaction {
                method: Method::OPTIONS,
                branch: "z9hG4bK.dbg".to_string(),
                worker: worker.handle.clone(),
            })
            .await;
        let dump = dispatcher.debug_format().await;
        assert!(dump.contains("1 record(s)"));
    }
}
