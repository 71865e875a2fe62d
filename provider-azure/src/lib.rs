//! Azure adapter
//!
//! Lists resource-group scoped ARM resources with a pre-issued access token.
//! ARM ids are compared case-insensitively by Azure, so every id this crate
//! emits is lowercased.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{
    AzureAssociationClient, AzureConnector, AzureCvmClient, AzureDiskClient, AzureEipClient,
    AzureNetworkInterfaceClient,
};
pub use error::{AzureError, Result};

use std::sync::Arc;

use bridge_traits::vendor::VendorResourceClient;

/// One client per kind Azure supports.
pub fn resource_clients(connector: Arc<AzureConnector>) -> Vec<Arc<dyn VendorResourceClient>> {
    vec![
        Arc::new(AzureEipClient::new(connector.clone())),
        Arc::new(AzureCvmClient::new(connector.clone())),
        Arc::new(AzureDiskClient::new(connector.clone())),
        Arc::new(AzureNetworkInterfaceClient::new(connector)),
    ]
}
