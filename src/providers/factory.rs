use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{
    ArweaveProvider, CkEthProvider, HttpTransport, IcpProvider, PolkadotProvider, RpcTransport, SharedProvider,
    SolanaProvider,
};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::types::Chain;

/// The only place providers are constructed.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Provider for `chain` talking HTTP to its configured endpoint.
    pub fn create(chain: Chain, config: &ProviderConfig) -> Result<SharedProvider> {
        let endpoint = config.endpoint(chain);
        debug!(%chain, endpoint = %endpoint, "creating provider");
        let transport = HttpTransport::new(chain, endpoint, Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::create_with_transport(chain, Arc::new(transport)))
    }

    pub fn create_with_transport(chain: Chain, transport: Arc<dyn RpcTransport>) -> SharedProvider {
        match chain {
            Chain::CkEth => Arc::new(CkEthProvider::new(transport)),
            Chain::Polkadot => Arc::new(PolkadotProvider::new(transport)),
            Chain::Solana => Arc::new(SolanaProvider::new(transport)),
            Chain::Icp => Arc::new(IcpProvider::new(transport)),
            Chain::Arweave => Arc::new(ArweaveProvider::new(transport)),
        }
    }

    /// Resolve a chain tag; unknown tags are `UnsupportedChain`.
    pub fn create_from_tag(tag: &str, config: &ProviderConfig) -> Result<SharedProvider> {
        Self::create(Chain::from_str(tag)?, config)
    }
}
