//! HuaWei Cloud adapter
//!
//! EIPs and ports come from the VPC service, instances from ECS and volumes
//! from EVS. Every request is signed with the APIG `SDK-HMAC-SHA256` scheme.

pub mod connector;
pub mod error;
pub mod signer;
pub mod types;

pub use connector::{
    HuaWeiAssociationClient, HuaWeiConnector, HuaWeiCvmClient, HuaWeiDiskClient, HuaWeiEipClient,
    HuaWeiNetworkInterfaceClient,
};
pub use error::{HuaWeiError, Result};

use std::sync::Arc;

use bridge_traits::vendor::VendorResourceClient;

pub fn resource_clients(connector: Arc<HuaWeiConnector>) -> Vec<Arc<dyn VendorResourceClient>> {
    vec![
        Arc::new(HuaWeiEipClient::new(connector.clone())),
        Arc::new(HuaWeiCvmClient::new(connector.clone())),
        Arc::new(HuaWeiDiskClient::new(connector.clone())),
        Arc::new(HuaWeiNetworkInterfaceClient::new(connector)),
    ]
}
