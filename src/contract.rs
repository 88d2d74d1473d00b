use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::contract::{Contract, ContractError};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use thiserror::Error;
use tracing::debug;

use crate::address::WalletAddress;

const BALANCE_OF: &str = "balanceOf";

#[derive(Debug, Error)]
pub enum BalanceError {
    /// Transport-level failure talking to the node.
    #[error("RPC request failed: {0}")]
    Rpc(String),
    /// The node answered but the call reverted or could not be encoded/decoded.
    #[error("contract call failed: {0}")]
    ContractCall(String),
}

impl From<ContractError<Provider<Http>>> for BalanceError {
    fn from(err: ContractError<Provider<Http>>) -> Self {
        match err {
            ContractError::MiddlewareError { .. } | ContractError::ProviderError { .. } => {
                BalanceError::Rpc(err.to_string())
            }
            other => BalanceError::ContractCall(other.to_string()),
        }
    }
}

/// Anything that can answer "how many tokens does this address hold".
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balance_of(&self, owner: WalletAddress) -> Result<U256, BalanceError>;
}

/// Read-only handle on the NFT contract. Holds no per-call state, so one
/// instance is shared by every handler.
pub struct ContractClient {
    provider: Arc<Provider<Http>>,
    contract: Contract<Provider<Http>>,
}

impl ContractClient {
    pub fn new(rpc_url: &str, address: Address, abi: Abi) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow::anyhow!("Invalid RPC URL '{}': {}", rpc_url, e))?;
        let provider = Arc::new(provider);
        let contract = Contract::new(address, abi, provider.clone());
        Ok(Self { provider, contract })
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// Connectivity probe used at startup.
    pub async fn chain_id(&self) -> Result<U256, BalanceError> {
        self.provider
            .get_chainid()
            .await
            .map_err(|e| BalanceError::Rpc(e.to_string()))
    }
}

#[async_trait]
impl BalanceSource for ContractClient {
    async fn balance_of(&self, owner: WalletAddress) -> Result<U256, BalanceError> {
        debug!("Calling {}({}) on {:?}", BALANCE_OF, owner, self.address());

        let call = self
            .contract
            .method::<_, U256>(BALANCE_OF, owner.as_address())
            .map_err(|e| BalanceError::ContractCall(e.to_string()))?;

        Ok(call.call().await?)
    }
}
