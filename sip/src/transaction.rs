//! In-memory registry of SIP client and server transactions.
//!
//! The store is owned by a single dispatcher; every operation is
//! sequential. Mutators never surface errors to callers on protocol
//! paths: a bad message or a duplicate insert is logged and the store
//! left unchanged.

use std::fmt::Write as _;

use anyhow::{anyhow, Result};
use strum_macros;
use strum_macros::EnumString;
use tracing::{debug, error, warn};
use vega_utils::monotonic_seconds;

use crate::key::{self, ClientId, ServerTransactionId};
use crate::message::{Message, Method};
use crate::worker::{WorkerHandle, WorkerSignal};

/// Seconds a record stays in the store before the expiry sweep may
/// evict it. Covers the longest RFC 3261 transaction timers with room
/// to spare.
pub const TRANSACTION_LIFETIME: u64 = 300;

#[derive(strum_macros::Display, EnumString, PartialEq, Eq, Clone, Debug)]
pub enum TransactionType {
    Client,
    Server,
}

/// Primary match key. No two records in a store share one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionId {
    Client(ClientId),
    Server(String),
}

impl TransactionId {
    pub fn tx_type(&self) -> TransactionType {
        match self {
            TransactionId::Client(_) => TransactionType::Client,
            TransactionId::Server(_) => TransactionType::Server,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransactionState {
    token: u64,
    pub id: TransactionId,
    /// Secondary key for server INVITE transactions, so a 2543-style
    /// ACK can find the transaction after an intermediate proxy
    /// regenerated the branch.
    pub ack_id: Option<String>,
    pub worker: Option<WorkerHandle>,
    pub appdata: Option<serde_json::Value>,
    /// To-tag of the response this transaction sent, checked when
    /// matching 2543 ACKs.
    pub response_to_tag: Option<String>,
    /// `(branch, method)` pairs for which stateless responses were
    /// forwarded through this transaction. Set semantics, stored in
    /// append order.
    pub stateless_response_branches: Vec<(String, Method)>,
    /// Absolute monotonic seconds; 0 means never.
    pub expire: u64,
}

impl TransactionState {
    /// Stable identity across in-place updates.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn tx_type(&self) -> TransactionType {
        self.id.tx_type()
    }
}

#[derive(Default, Debug)]
pub struct TransactionStore {
    records: Vec<TransactionState>,
    next_token: u64,
}

impl TransactionStore {
    pub fn new() -> TransactionStore {
        TransactionStore::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(
        &mut self,
        id: TransactionId,
        ack_id: Option<String>,
        worker: WorkerHandle,
    ) -> Option<u64> {
        if let Some(existing) = self.records.iter().find(|r| r.id == id) {
            warn!(
                token = existing.token,
                "transaction already exists, ignoring duplicate add: {:?}", id
            );
            return None;
        }

        self.next_token += 1;
        let token = self.next_token;
        self.records.push(TransactionState {
            token,
            id,
            ack_id,
            worker: Some(worker),
            appdata: None,
            response_to_tag: None,
            stateless_response_branches: Vec::new(),
            expire: monotonic_seconds() + TRANSACTION_LIFETIME,
        });
        Some(token)
    }

    /// Register the client transaction we created by sending a request
    /// with this branch. Returns the record token, or `None` on a
    /// duplicate.
    pub fn add_client_transaction(
        &mut self,
        method: Method,
        branch: String,
        worker: WorkerHandle,
    ) -> Option<u64> {
        self.insert(
            TransactionId::Client(ClientId { branch, method }),
            None,
            worker,
        )
    }

    /// Register a server transaction for an incoming request. INVITE
    /// transactions also get their 2543 ACK id computed and stored.
    pub fn add_server_transaction(
        &mut self,
        request: &Message,
        worker: WorkerHandle,
    ) -> Option<u64> {
        let id = match key::server_transaction_id(request) {
            Ok(ServerTransactionId::Id(id)) => id,
            Ok(ServerTransactionId::Rfc2543Ack) => {
                warn!("not adding a server transaction for a 2543 ACK");
                return None;
            }
            Err(e) => {
                error!("could not compute server transaction id: {e}");
                return None;
            }
        };

        let ack_id = match request.method {
            Some(Method::INVITE) => {
                match key::server_transaction_ack_id_2543(request) {
                    Ok(ack_id) => Some(ack_id),
                    Err(e) => {
                        error!("could not compute 2543 ack id: {e}");
                        return None;
                    }
                }
            }
            _ => None,
        };

        self.insert(TransactionId::Server(id), ack_id, worker)
    }

    pub fn get(&self, token: u64) -> Option<&TransactionState> {
        self.records.iter().find(|r| r.token == token)
    }

    pub fn get_client_transaction(
        &self,
        method: &Method,
        branch: &str,
    ) -> Option<&TransactionState> {
        self.records.iter().find(|r| match &r.id {
            TransactionId::Client(id) => {
                id.branch == branch && &id.method == method
            }
            TransactionId::Server(_) => false,
        })
    }

    fn get_server_transaction(&self, id: &str) -> Option<&TransactionState> {
        self.records
            .iter()
            .find(|r| matches!(&r.id, TransactionId::Server(sid) if sid == id))
    }

    /// Match an incoming request against the server transactions. ACKs
    /// that miss the RFC 3261 lookup fall back to 2543 ACK matching,
    /// which also covers branches regenerated by pre-3261 proxies.
    pub fn get_server_transaction_using_request(
        &self,
        request: &Message,
    ) -> Result<Option<&TransactionState>> {
        let id = match key::server_transaction_id(request) {
            Ok(ServerTransactionId::Id(id)) => id,
            Ok(ServerTransactionId::Rfc2543Ack) => {
                return Ok(self.match_2543_ack(request));
            }
            Err(e) => {
                error!("could not compute server transaction id: {e}");
                return Err(e.into());
            }
        };

        match self.get_server_transaction(&id) {
            Some(record) => Ok(Some(record)),
            None if request.method == Some(Method::ACK) => {
                // An intermediate RFC 3261 proxy may have put its own
                // branch on the ACK; the 2543 algorithm still finds the
                // INVITE transaction.
                Ok(self.match_2543_ack(request))
            }
            None => Ok(None),
        }
    }

    fn match_2543_ack(&self, request: &Message) -> Option<&TransactionState> {
        let ack_id = match key::server_transaction_ack_id_2543(request) {
            Ok(ack_id) => ack_id,
            Err(e) => {
                error!("could not compute 2543 ack id: {e}");
                return None;
            }
        };
        let to_tag = request.to.tag();

        for record in &self.records {
            if record.ack_id.as_deref() != Some(ack_id.as_str()) {
                continue;
            }
            if record.response_to_tag.as_deref() == to_tag {
                return Some(record);
            }
            debug!(
                token = record.token,
                "2543 ack id matches but to-tag differs, skipping"
            );
        }
        None
    }

    /// A stateless server can match one of its own outbound responses
    /// back to the transaction that produced it.
    pub fn get_server_transaction_using_response(
        &self,
        response: &Message,
    ) -> Result<Option<&TransactionState>> {
        match key::server_transaction_id_from_response(response) {
            Ok(Some(id)) => Ok(self.get_server_transaction(&id)),
            Ok(None) => {
                debug!("response top via has a pre-3261 branch, no server id");
                Ok(None)
            }
            Err(e) => {
                error!("could not compute server transaction id from response: {e}");
                Err(e.into())
            }
        }
    }

    pub fn get_server_transaction_using_stateless_response_branch(
        &self,
        branch: &str,
        method: &Method,
    ) -> Option<&TransactionState> {
        self.records.iter().find(|r| {
            r.stateless_response_branches
                .iter()
                .any(|(b, m)| b == branch && m == method)
        })
    }

    pub fn get_by_worker(&self, worker: &WorkerHandle) -> Vec<&TransactionState> {
        self.records
            .iter()
            .filter(|r| r.worker.as_ref() == Some(worker))
            .collect()
    }

    /// The single transaction driven by `worker`, or an error when the
    /// worker drives more than one.
    pub fn get_by_worker_unique(
        &self,
        worker: &WorkerHandle,
    ) -> Result<Option<&TransactionState>> {
        let mut matches = self.get_by_worker(worker);
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(anyhow!("{worker} drives {n} transactions, expected one")),
        }
    }

    fn get_mut(&mut self, token: u64) -> Option<&mut TransactionState> {
        let record = self.records.iter_mut().find(|r| r.token == token);
        if record.is_none() {
            warn!(token, "no transaction with this token");
        }
        record
    }

    pub fn set_worker(&mut self, token: u64, worker: Option<WorkerHandle>) {
        if let Some(record) = self.get_mut(token) {
            record.worker = worker;
        }
    }

    pub fn set_appdata(&mut self, token: u64, appdata: Option<serde_json::Value>) {
        if let Some(record) = self.get_mut(token) {
            record.appdata = appdata;
        }
    }

    pub fn set_response_to_tag(&mut self, token: u64, tag: Option<String>) {
        if let Some(record) = self.get_mut(token) {
            record.response_to_tag = tag;
        }
    }

    /// Record that a stateless response for `(branch, method)` was
    /// forwarded through this transaction. Appending a pair already
    /// present is a no-op.
    pub fn append_response_branch(
        &mut self,
        token: u64,
        branch: String,
        method: Method,
    ) {
        if let Some(record) = self.get_mut(token) {
            let present = record
                .stateless_response_branches
                .iter()
                .any(|(b, m)| b == &branch && m == &method);
            if !present {
                record.stateless_response_branches.push((branch, method));
            }
        }
    }

    /// Replace the record with the same token. A caller holding a
    /// record for an unknown token has lost track of the store state;
    /// everything is dropped so the bug cannot spread stale matches.
    pub fn update(&mut self, record: TransactionState) {
        match self.records.iter_mut().find(|r| r.token == record.token) {
            Some(slot) => *slot = record,
            None => {
                error!(
                    token = record.token,
                    "update for unknown transaction token, clearing store"
                );
                self.records.clear();
            }
        }
    }

    pub fn delete_by_worker(&mut self, worker: &WorkerHandle) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.worker.as_ref() != Some(worker));
        before - self.records.len()
    }

    /// Drop every record whose expiry has passed, signaling live
    /// workers so they can unwind. Signal delivery is best-effort.
    pub fn delete_expired(&mut self) -> usize {
        self.delete_expired_at(monotonic_seconds())
    }

    fn delete_expired_at(&mut self, now: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|record| {
            if record.expire == 0 || record.expire > now {
                return true;
            }
            debug!(token = record.token, "transaction expired");
            if let Some(worker) = &record.worker {
                if worker.alive() {
                    worker.signal(WorkerSignal::Expired {
                        token: record.token,
                    });
                }
            }
            false
        });
        before - self.records.len()
    }

    /// Immutable snapshot of the store for logging.
    pub fn debug_format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "transaction store, {} record(s):", self.records.len());
        for record in &self.records {
            let _ = writeln!(
                out,
                "#{} {} id={:?} ack_id={:?} worker={} expire={}",
                record.token,
                record.tx_type(),
                record.id,
                record.ack_id,
                record
                    .worker
                    .as_ref()
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                record.expire,
            );
        }
        out
    }
}
