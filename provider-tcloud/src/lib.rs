//! TencentCloud adapter
//!
//! Lists EIPs (`vpc`), instances (`cvm`) and cloud disks (`cbs`) through the
//! TencentCloud API 3.0 and binds EIPs with `AssociateAddress`.

pub mod connector;
pub mod error;
pub mod signer;
pub mod types;

pub use connector::{
    TCloudAssociationClient, TCloudConnector, TCloudCvmClient, TCloudDiskClient, TCloudEipClient,
};
pub use error::{Result, TCloudError};

use std::sync::Arc;

use bridge_traits::vendor::VendorResourceClient;

/// One client per kind TencentCloud supports.
pub fn resource_clients(connector: Arc<TCloudConnector>) -> Vec<Arc<dyn VendorResourceClient>> {
    vec![
        Arc::new(TCloudEipClient::new(connector.clone())),
        Arc::new(TCloudCvmClient::new(connector.clone())),
        Arc::new(TCloudDiskClient::new(connector)),
    ]
}
