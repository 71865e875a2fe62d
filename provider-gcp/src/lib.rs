//! GCP adapter
//!
//! Reads the Compute Engine v1 REST API with a pre-issued OAuth token.
//! Network interfaces are not a top-level GCP resource; they are flattened
//! out of the instance listing and identified as `{instance_id}_{nic_name}`.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{
    GcpAssociationClient, GcpConnector, GcpCvmClient, GcpDiskClient, GcpEipClient,
    GcpNetworkInterfaceClient,
};
pub use error::{GcpError, Result};

use std::sync::Arc;

use bridge_traits::vendor::VendorResourceClient;

/// One client per kind GCP supports.
pub fn resource_clients(connector: Arc<GcpConnector>) -> Vec<Arc<dyn VendorResourceClient>> {
    vec![
        Arc::new(GcpEipClient::new(connector.clone())),
        Arc::new(GcpCvmClient::new(connector.clone())),
        Arc::new(GcpDiskClient::new(connector.clone())),
        Arc::new(GcpNetworkInterfaceClient::new(connector)),
    ]
}
