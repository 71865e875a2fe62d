//! AWS adapter
//!
//! Talks to the EC2 Query API (`Version=2016-11-15`) with SigV4-signed form
//! POSTs and parses its XML responses.

pub mod connector;
pub mod error;
pub mod signer;
pub mod types;

pub use connector::{
    AwsAssociationClient, AwsConnector, AwsCvmClient, AwsDiskClient, AwsEipClient,
};
pub use error::{AwsError, Result};

use std::sync::Arc;

use bridge_traits::vendor::VendorResourceClient;

/// One client per kind AWS supports.
pub fn resource_clients(connector: Arc<AwsConnector>) -> Vec<Arc<dyn VendorResourceClient>> {
    vec![
        Arc::new(AwsEipClient::new(connector.clone())),
        Arc::new(AwsCvmClient::new(connector.clone())),
        Arc::new(AwsDiskClient::new(connector)),
    ]
}
