//! # Vendor Registry
//!
//! Maps `(vendor, kind)` to the client that lists it. The registry is built
//! once at startup and is immutable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bridge_traits::resource::{ResourceKind, Vendor};
use bridge_traits::vendor::{EipAssociationClient, VendorResourceClient};
use tracing::debug;

use crate::diff::{ChangePredicate, StatusChanged};
use crate::{Result, SyncError};

pub type ClientKey = (Vendor, ResourceKind);

pub struct VendorRegistry {
    clients: HashMap<ClientKey, Arc<dyn VendorResourceClient>>,
    associations: HashMap<Vendor, Arc<dyn EipAssociationClient>>,
    predicates: HashMap<ClientKey, Arc<dyn ChangePredicate>>,
    default_predicate: Arc<dyn ChangePredicate>,
}

impl VendorRegistry {
    pub fn builder() -> VendorRegistryBuilder {
        VendorRegistryBuilder::default()
    }

    /// # Errors
    ///
    /// Returns `UnsupportedResource` if no client was registered for the pair.
    pub fn resolve(&self, vendor: Vendor, kind: ResourceKind) -> Result<Arc<dyn VendorResourceClient>> {
        self.clients
            .get(&(vendor, kind))
            .cloned()
            .ok_or(SyncError::UnsupportedResource { vendor, kind })
    }

    pub fn association(&self, vendor: Vendor) -> Result<Arc<dyn EipAssociationClient>> {
        self.associations
            .get(&vendor)
            .cloned()
            .ok_or(SyncError::UnsupportedResource {
                vendor,
                kind: ResourceKind::Eip,
            })
    }

    /// Change predicate of a pair, `StatusChanged` unless overridden.
    pub fn predicate(&self, vendor: Vendor, kind: ResourceKind) -> Arc<dyn ChangePredicate> {
        self.predicates
            .get(&(vendor, kind))
            .cloned()
            .unwrap_or_else(|| self.default_predicate.clone())
    }

    /// Registered pairs, sorted.
    pub fn supported(&self) -> Vec<ClientKey> {
        let mut keys: Vec<_> = self.clients.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("clients", &self.supported())
            .field("associations", &self.associations.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct VendorRegistryBuilder {
    clients: Vec<Arc<dyn VendorResourceClient>>,
    associations: Vec<Arc<dyn EipAssociationClient>>,
    predicates: HashMap<ClientKey, Arc<dyn ChangePredicate>>,
}

impl VendorRegistryBuilder {
    pub fn with_client(mut self, client: Arc<dyn VendorResourceClient>) -> Self {
        self.clients.push(client);
        self
    }

    pub fn with_clients<I>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn VendorResourceClient>>,
    {
        self.clients.extend(clients);
        self
    }

    pub fn with_association(mut self, client: Arc<dyn EipAssociationClient>) -> Self {
        self.associations.push(client);
        self
    }

    pub fn with_associations<I>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn EipAssociationClient>>,
    {
        self.associations.extend(clients);
        self
    }

    pub fn with_predicate(
        mut self,
        vendor: Vendor,
        kind: ResourceKind,
        predicate: Arc<dyn ChangePredicate>,
    ) -> Self {
        self.predicates.insert((vendor, kind), predicate);
        self
    }

    /// # Errors
    ///
    /// Returns `UnsupportedResource` if a client lists a kind its vendor does
    /// not offer.
    pub fn build(self) -> Result<VendorRegistry> {
        let mut clients = HashMap::new();
        for client in self.clients {
            let (vendor, kind) = (client.vendor(), client.kind());
            if !vendor.supported_kinds().contains(&kind) {
                return Err(SyncError::UnsupportedResource { vendor, kind });
            }
            if clients.insert((vendor, kind), client).is_some() {
                debug!(vendor = %vendor, kind = %kind, "Replaced previously registered client");
            }
        }

        let associations = self
            .associations
            .into_iter()
            .map(|client| (client.vendor(), client))
            .collect();

        Ok(VendorRegistry {
            clients,
            associations,
            predicates: self.predicates,
            default_predicate: Arc::new(StatusChanged),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::resource::SyncScope;
    use bridge_traits::vendor::{PageToken, ResourcePage, VendorResult};

    struct EmptyClient(Vendor, ResourceKind);

    #[async_trait]
    impl VendorResourceClient for EmptyClient {
        fn vendor(&self) -> Vendor {
            self.0
        }

        fn kind(&self) -> ResourceKind {
            self.1
        }

        async fn list_page(
            &self,
            _scope: &SyncScope,
            _page: Option<PageToken>,
        ) -> VendorResult<ResourcePage> {
            Ok(ResourcePage::default())
        }
    }

    #[test]
    fn test_resolve_and_supported() {
        let registry = VendorRegistry::builder()
            .with_client(Arc::new(EmptyClient(Vendor::Gcp, ResourceKind::Disk)))
            .with_client(Arc::new(EmptyClient(Vendor::Aws, ResourceKind::Eip)))
            .build()
            .unwrap();

        assert!(registry.resolve(Vendor::Aws, ResourceKind::Eip).is_ok());
        assert!(matches!(
            registry.resolve(Vendor::Aws, ResourceKind::Disk),
            Err(SyncError::UnsupportedResource { .. })
        ));
        assert_eq!(
            registry.supported(),
            vec![(Vendor::Aws, ResourceKind::Eip), (Vendor::Gcp, ResourceKind::Disk)]
        );
        assert!(registry.association(Vendor::Aws).is_err());
    }

    #[test]
    fn test_kind_outside_vendor_matrix_is_rejected() {
        let result = VendorRegistry::builder()
            .with_client(Arc::new(EmptyClient(Vendor::TCloud, ResourceKind::NetworkInterface)))
            .build();
        assert!(result.is_err());
    }
}
