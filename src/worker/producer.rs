// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The source of truth the worker mirrors into the store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::digest::DigestTree;

/// One page of source objects, keyed by object id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: BTreeMap<String, Vec<u8>>,
    /// Empty on the last page.
    pub next_token: String,
}

impl ObjectPage {
    pub fn last(objects: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            objects,
            next_token: String::new(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("producer failed for network '{network}': {message}")]
pub struct ProducerError {
    pub network: String,
    pub message: String,
}

impl ProducerError {
    pub fn new(network: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            message: message.into(),
        }
    }
}

/// Computes digests and serves the objects they cover.
///
/// `digest_tree` and the pages read right after it should describe the same
/// data; a mismatch only lasts until the next refresh of that network.
#[async_trait]
pub trait DigestProducer: Send + Sync {
    /// Networks that currently exist. Everything else is garbage collected.
    async fn live_networks(&self) -> Result<Vec<String>, ProducerError>;

    /// Fresh digest tree of `network`.
    async fn digest_tree(&self, network: &str) -> Result<DigestTree, ProducerError>;

    /// The page of `network`'s objects following `page_token` ("" = first).
    async fn load_page(&self, network: &str, page_token: &str) -> Result<ObjectPage, ProducerError>;
}
