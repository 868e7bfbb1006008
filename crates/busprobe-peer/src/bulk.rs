//! Bulk credential testing.
//!
//! Candidate tokens are split across `width` workers by index. Each worker
//! tries its share one at a time, every attempt on a fresh connection, and
//! tries each token exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use busprobe_transport::Address;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::connector::connect;
use crate::error::PeerError;
use crate::handshake::{authenticate_user, Credentials, HandshakeConfig};

/// Parameters of a bulk run.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Number of concurrent workers. Zero is treated as one.
    pub width: usize,
    pub handshake: HandshakeConfig,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            width: 8,
            handshake: HandshakeConfig::default(),
        }
    }
}

#[derive(Default)]
struct Counters {
    accepted: AtomicUsize,
    rejected: AtomicUsize,
    errors: AtomicUsize,
}

/// Totals of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub attempts: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub errors: usize,
    /// Tokens the peer accepted, in dictionary order.
    pub accepted_tokens: Vec<String>,
}

/// Try `user` with every token against `address`.
pub async fn test_credentials(
    address: &Address,
    user: &str,
    tokens: Vec<String>,
    config: &BulkConfig,
) -> BulkReport {
    let width = config.width.max(1).min(tokens.len().max(1));
    let tokens = Arc::new(tokens);
    let counters = Arc::new(Counters::default());
    let found = Arc::new(Mutex::new(Vec::new()));

    let mut workers = JoinSet::new();
    for worker in 0..width {
        let tokens = Arc::clone(&tokens);
        let counters = Arc::clone(&counters);
        let found = Arc::clone(&found);
        let address = address.clone();
        let user = user.to_string();
        let handshake = config.handshake.clone();
        workers.spawn(async move {
            for index in (worker..tokens.len()).step_by(width) {
                let credentials = Credentials::new(user.as_str(), tokens[index].as_str());
                match attempt(&address, &credentials, &handshake).await {
                    Ok(()) => {
                        counters.accepted.fetch_add(1, Ordering::Relaxed);
                        info!(worker, index, "credentials accepted");
                        found
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .push(index);
                    }
                    Err(PeerError::AuthenticationFailed(reason)) => {
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                        debug!(worker, index, %reason, "credentials rejected");
                    }
                    Err(err) => {
                        counters.errors.fetch_add(1, Ordering::Relaxed);
                        debug!(worker, index, error = %err, "attempt failed");
                    }
                }
            }
        });
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "worker task failed");
        }
    }

    let mut indices = std::mem::take(
        &mut *found
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner),
    );
    indices.sort_unstable();
    let accepted = counters.accepted.load(Ordering::Relaxed);
    let rejected = counters.rejected.load(Ordering::Relaxed);
    let errors = counters.errors.load(Ordering::Relaxed);
    BulkReport {
        attempts: accepted + rejected + errors,
        accepted,
        rejected,
        errors,
        accepted_tokens: indices.into_iter().map(|i| tokens[i].clone()).collect(),
    }
}

async fn attempt(
    address: &Address,
    credentials: &Credentials,
    config: &HandshakeConfig,
) -> Result<(), PeerError> {
    let endpoint = connect(address).await?;
    let result = authenticate_user(&endpoint, credentials, config)
        .await
        .map(|_| ());
    endpoint.close().await;
    result
}
