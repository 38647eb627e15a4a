//! Live transactions, keyed by (branch, method).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::client::{ClientTransaction, ClientTransactionData};
use crate::error::{Error, Result};
use crate::server::{ServerTransaction, ServerTransactionData};
use crate::transaction::TransactionKey;

#[derive(Debug, Default)]
pub struct TransactionRegistry {
    client: DashMap<TransactionKey, ClientTransaction>,
    server: DashMap<TransactionKey, ServerTransaction>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_client(&self, transaction: ClientTransaction) -> Result<()> {
        match self.client.entry(transaction.key().clone()) {
            Entry::Occupied(entry) => Err(Error::TransactionExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                trace!(id=%transaction.key(), "Client transaction registered");
                entry.insert(transaction);
                Ok(())
            }
        }
    }

    pub fn insert_server(&self, transaction: ServerTransaction) -> Result<()> {
        match self.server.entry(transaction.key().clone()) {
            Entry::Occupied(entry) => Err(Error::TransactionExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                trace!(id=%transaction.key(), "Server transaction registered");
                entry.insert(transaction);
                Ok(())
            }
        }
    }

    pub fn client(&self, key: &TransactionKey) -> Option<ClientTransaction> {
        self.client.get(key).map(|entry| entry.value().clone())
    }

    pub fn server(&self, key: &TransactionKey) -> Option<ServerTransaction> {
        self.server.get(key).map(|entry| entry.value().clone())
    }

    /// Removes the client entry for `key` only if it still belongs to `data`.
    pub(crate) fn remove_client_if_same(&self, key: &TransactionKey, data: &ClientTransactionData) {
        if self
            .client
            .remove_if(key, |_, tx| std::ptr::eq(Arc::as_ptr(&tx.data), data))
            .is_some()
        {
            trace!(id=%key, "Client transaction removed");
        }
    }

    /// Removes the server entry for `key` only if it still belongs to `data`.
    pub(crate) fn remove_server_if_same(&self, key: &TransactionKey, data: &ServerTransactionData) {
        if self
            .server
            .remove_if(key, |_, tx| std::ptr::eq(Arc::as_ptr(&tx.data), data))
            .is_some()
        {
            trace!(id=%key, "Server transaction removed");
        }
    }

    /// Snapshot of the live client transactions.
    pub fn clients(&self) -> Vec<ClientTransaction> {
        self.client.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Snapshot of the live server transactions.
    pub fn servers(&self) -> Vec<ServerTransaction> {
        self.server.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn client_count(&self) -> usize {
        self.client.len()
    }

    pub fn server_count(&self) -> usize {
        self.server.len()
    }
}
