//! Forwarding-plane programming stage.

use crate::aft::EntryKey;
use crate::error::{AftError, Result};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::time::Duration;

/// One change pushed to the forwarding plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FibChange {
    Install(EntryKey),
    Remove(EntryKey),
}

impl FibChange {
    pub fn key(&self) -> &EntryKey {
        match self {
            FibChange::Install(k) | FibChange::Remove(k) => k,
        }
    }
}

/// Pushes RIB changes into the forwarding plane.
///
/// Both operations must be idempotent: installing an installed key and
/// removing an absent key succeed.
#[async_trait]
pub trait FibProgrammer: Send + Sync {
    async fn program(&self, change: &FibChange) -> Result<()>;

    fn is_installed(&self, key: &EntryKey) -> bool;
}

/// Forwarding plane kept in memory, with optional capacity and latency.
#[derive(Debug, Default)]
pub struct InMemoryFib {
    installed: Mutex<BTreeSet<EntryKey>>,
    capacity: usize,
    latency: Option<Duration>,
}

impl InMemoryFib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the number of installed entries; 0 means unbounded.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Delays every change, to exercise acknowledgment timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn installed_count(&self) -> usize {
        self.installed.lock().len()
    }
}

#[async_trait]
impl FibProgrammer for InMemoryFib {
    async fn program(&self, change: &FibChange) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut installed = self.installed.lock();
        match change {
            FibChange::Install(key) => {
                if installed.contains(key) {
                    return Ok(());
                }
                if self.capacity > 0 && installed.len() >= self.capacity {
                    return Err(AftError::FibExhausted {
                        capacity: self.capacity,
                    });
                }
                debug!("InMemoryFib: installed {}", key);
                installed.insert(key.clone());
            }
            FibChange::Remove(key) => {
                if installed.remove(key) {
                    debug!("InMemoryFib: removed {}", key);
                }
            }
        }
        Ok(())
    }

    fn is_installed(&self, key: &EntryKey) -> bool {
        self.installed.lock().contains(key)
    }
}
