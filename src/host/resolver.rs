//! Host address resolution from a fixed table

use super::{HostError, HostResolver};
use crate::crypto::HostKey;

use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves host keys from a table, typically the `[hosts]` config section
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    addresses: HashMap<HostKey, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host_key: HostKey, address: impl Into<String>) -> Self {
        self.addresses.insert(host_key, address.into());
        self
    }

    pub fn insert(&mut self, host_key: HostKey, address: impl Into<String>) {
        self.addresses.insert(host_key, address.into());
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl FromIterator<(HostKey, String)> for StaticResolver {
    fn from_iter<I: IntoIterator<Item = (HostKey, String)>>(iter: I) -> Self {
        Self {
            addresses: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host_key: &HostKey) -> Result<String, HostError> {
        self.addresses
            .get(host_key)
            .cloned()
            .ok_or_else(|| HostError::UnknownHost(host_key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve() {
        let known = HostKey::from_bytes([1; 32]);
        let resolver = StaticResolver::new().with_host(known, "127.0.0.1:9982");

        assert_eq!(resolver.resolve(&known).await.unwrap(), "127.0.0.1:9982");

        let unknown = HostKey::from_bytes([2; 32]);
        assert!(matches!(
            resolver.resolve(&unknown).await,
            Err(HostError::UnknownHost(_))
        ));
    }
}
