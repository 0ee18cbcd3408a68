//! Classification of a currency pair into a transaction type
//!
//! Pure derivation over the configured bridge routes; re-run on every change
//! of the selected currencies.

use super::{BridgeProtocol, Currency, TransactionType};
use crate::config::{parse_address, Settings};
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::Address;
use std::collections::{HashMap, HashSet};

/// One bridgeable asset and its deployments
#[derive(Debug, Clone)]
pub struct BridgeRoute {
    pub asset: String,
    pub protocol: BridgeProtocol,
    pub decimals: u8,
    /// chain id -> token address
    pub tokens: HashMap<u64, Address>,
    /// chain id -> contract the bridge is called on, when not the token itself
    pub routers: HashMap<u64, Address>,
}

impl BridgeRoute {
    pub fn token_on(&self, chain_id: u64) -> Option<Address> {
        self.tokens.get(&chain_id).copied()
    }

    /// Contract receiving the bridge call on `chain_id`
    pub fn router_on(&self, chain_id: u64) -> Option<Address> {
        self.routers
            .get(&chain_id)
            .copied()
            .or_else(|| self.token_on(chain_id))
    }

    fn connects(&self, from: u64, to: u64) -> bool {
        self.tokens.contains_key(&from) && self.tokens.contains_key(&to)
    }

    fn currency_on(&self, chain_id: u64) -> Option<Currency> {
        self.token_on(chain_id).map(|address| Currency {
            chain_id,
            address,
            symbol: self.asset.clone(),
            decimals: self.decimals,
        })
    }
}

/// Known bridge routes plus the Superchain interop set
#[derive(Debug, Clone, Default)]
pub struct BridgeRegistry {
    routes: Vec<BridgeRoute>,
    superchain: HashSet<u64>,
}

impl BridgeRegistry {
    pub fn new(routes: Vec<BridgeRoute>, superchain: HashSet<u64>) -> Self {
        Self { routes, superchain }
    }

    /// Build the registry from configured routes, resolving chain names to IDs
    pub fn from_settings(settings: &Settings) -> OrchestratorResult<Self> {
        let mut routes = Vec::with_capacity(settings.bridges.len());

        for bridge in &settings.bridges {
            let tokens = resolve_addresses(settings, &bridge.tokens)?;
            let routers = resolve_addresses(settings, &bridge.routers)?;
            routes.push(BridgeRoute {
                asset: bridge.asset.clone(),
                protocol: bridge.protocol,
                decimals: bridge.decimals,
                tokens,
                routers,
            });
        }

        let superchain = settings
            .chains
            .values()
            .filter(|c| c.enabled && c.superchain)
            .map(|c| c.chain_id)
            .collect();

        Ok(Self::new(routes, superchain))
    }

    pub fn is_superchain(&self, chain_id: u64) -> bool {
        self.superchain.contains(&chain_id)
    }

    pub fn routes(&self) -> &[BridgeRoute] {
        &self.routes
    }

    /// Route of the given protocol carrying `token` out of its chain
    pub fn route_for(&self, protocol: BridgeProtocol, token: &Currency) -> Option<&BridgeRoute> {
        self.routes
            .iter()
            .filter(|r| r.protocol == protocol)
            .find(|r| r.token_on(token.chain_id) == Some(token.address))
    }

    /// Classify a currency pair. `None` means no transaction is possible.
    pub fn classify(
        &self,
        currency_in: Option<&Currency>,
        currency_out: Option<&Currency>,
    ) -> Option<TransactionType> {
        let (currency_in, currency_out) = (currency_in?, currency_out?);

        if currency_in.chain_id == currency_out.chain_id {
            return Some(TransactionType::Swap {
                currency_in: currency_in.clone(),
                currency_out: currency_out.clone(),
                chain_id: currency_in.chain_id,
                with_superchain: self.is_superchain(currency_in.chain_id),
            });
        }

        let (chain_in, chain_out) = (currency_in.chain_id, currency_out.chain_id);

        // Input is already the bridgeable token
        if let Some(route) = self.best_route(chain_in, chain_out, |r| {
            r.token_on(chain_in) == Some(currency_in.address)
        }) {
            let bridged = route.currency_on(chain_out)?;
            let with_superchain = route.protocol == BridgeProtocol::Superchain;

            if bridged.address == currency_out.address {
                return Some(TransactionType::Bridge {
                    currency_in: currency_in.clone(),
                    currency_out: currency_out.clone(),
                    chain_in,
                    chain_out,
                    protocol: route.protocol,
                    with_superchain,
                });
            }

            return Some(TransactionType::BridgeSwap {
                currency_in: currency_in.clone(),
                currency_out: currency_out.clone(),
                chain_in,
                chain_out,
                bridged,
                protocol: route.protocol,
                with_superchain,
            });
        }

        // Output is the bridgeable token: swap into it on origin first
        if let Some(route) = self.best_route(chain_in, chain_out, |r| {
            r.token_on(chain_out) == Some(currency_out.address)
        }) {
            let bridged = route.currency_on(chain_in)?;
            return Some(TransactionType::SwapBridge {
                currency_in: currency_in.clone(),
                currency_out: currency_out.clone(),
                chain_in,
                chain_out,
                bridged,
                protocol: route.protocol,
                with_superchain: route.protocol == BridgeProtocol::Superchain,
            });
        }

        None
    }

    /// Lowest-ranked protocol wins; Superchain routes only between interop members
    fn best_route<F>(&self, chain_in: u64, chain_out: u64, matches: F) -> Option<&BridgeRoute>
    where
        F: Fn(&BridgeRoute) -> bool,
    {
        self.routes
            .iter()
            .filter(|r| r.connects(chain_in, chain_out))
            .filter(|r| {
                r.protocol != BridgeProtocol::Superchain
                    || (self.is_superchain(chain_in) && self.is_superchain(chain_out))
            })
            .filter(|r| matches(r))
            .min_by_key(|r| r.protocol)
    }
}

fn resolve_addresses(
    settings: &Settings,
    by_name: &HashMap<String, String>,
) -> OrchestratorResult<HashMap<u64, Address>> {
    by_name
        .iter()
        .map(|(chain_name, address)| {
            let chain_id = settings.chain_id_of(chain_name).ok_or_else(|| {
                OrchestratorError::Config(format!("Unknown chain {}", chain_name))
            })?;
            Ok((chain_id, parse_address(address)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE_CONFIG;
    use crate::transaction::fixtures::{address, native, token};

    fn registry() -> BridgeRegistry {
        let usdc = BridgeRoute {
            asset: "USDC".to_string(),
            protocol: BridgeProtocol::Hyperlane,
            decimals: 6,
            tokens: HashMap::from([(1, address(0xa1)), (10, address(0xa2))]),
            routers: HashMap::new(),
        };
        let usdc_stargate = BridgeRoute {
            protocol: BridgeProtocol::Stargate,
            ..usdc.clone()
        };
        let eth = BridgeRoute {
            asset: "ETH".to_string(),
            protocol: BridgeProtocol::Orbiter,
            decimals: 18,
            tokens: HashMap::from([(1, Address::zero()), (8453, Address::zero())]),
            routers: HashMap::new(),
        };
        let supr = BridgeRoute {
            asset: "SUPR".to_string(),
            protocol: BridgeProtocol::Superchain,
            decimals: 18,
            tokens: HashMap::from([(10, address(0xc0)), (8453, address(0xc0))]),
            routers: HashMap::new(),
        };
        let supr_hyperlane = BridgeRoute {
            protocol: BridgeProtocol::Hyperlane,
            ..supr.clone()
        };

        BridgeRegistry::new(
            vec![usdc_stargate, usdc, eth, supr_hyperlane, supr],
            HashSet::from([10, 8453]),
        )
    }

    #[test]
    fn test_unset_currency_yields_nothing() {
        let registry = registry();
        let usdc = token(1, 0xa1, "USDC");
        assert!(registry.classify(None, Some(&usdc)).is_none());
        assert!(registry.classify(Some(&usdc), None).is_none());
        assert!(registry.classify(None, None).is_none());
    }

    #[test]
    fn test_same_chain_is_always_swap() {
        let registry = registry();
        let pairs = [
            (token(1, 0xa1, "USDC"), token(1, 0xb1, "WBTC")),
            (native(1), token(1, 0xa1, "USDC")),
            (token(10, 0xa2, "USDC"), token(10, 0xa2, "USDC")),
            (token(999, 0x01, "X"), token(999, 0x02, "Y")),
        ];

        for (currency_in, currency_out) in pairs {
            let tx_type = registry.classify(Some(&currency_in), Some(&currency_out));
            assert!(matches!(tx_type, Some(TransactionType::Swap { .. })));
        }
    }

    #[test]
    fn test_swap_on_superchain_member_flags_superchain() {
        let registry = registry();
        let tx_type = registry
            .classify(Some(&token(10, 0xa2, "USDC")), Some(&token(10, 0xb2, "OP")))
            .unwrap();
        assert!(tx_type.with_superchain());
    }

    #[test]
    fn test_same_asset_across_chains_is_bridge() {
        let registry = registry();
        let tx_type = registry
            .classify(Some(&token(1, 0xa1, "USDC")), Some(&token(10, 0xa2, "USDC")))
            .unwrap();

        match tx_type {
            TransactionType::Bridge {
                chain_in,
                chain_out,
                protocol,
                with_superchain,
                ..
            } => {
                assert_eq!((chain_in, chain_out), (1, 10));
                // Hyperlane outranks Stargate regardless of config order
                assert_eq!(protocol, BridgeProtocol::Hyperlane);
                assert!(!with_superchain);
            }
            other => panic!("expected BRIDGE, got {:?}", other),
        }
    }

    #[test]
    fn test_bridgeable_input_with_other_output_is_bridge_swap() {
        let registry = registry();
        let tx_type = registry
            .classify(Some(&token(1, 0xa1, "USDC")), Some(&token(10, 0xb2, "OP")))
            .unwrap();

        match tx_type {
            TransactionType::BridgeSwap { bridged, .. } => {
                assert_eq!(bridged.chain_id, 10);
                assert_eq!(bridged.address, address(0xa2));
                assert_eq!(bridged.decimals, 6);
            }
            other => panic!("expected BRIDGE_SWAP, got {:?}", other),
        }
    }

    #[test]
    fn test_bridgeable_output_needs_origin_swap() {
        let registry = registry();
        let tx_type = registry
            .classify(Some(&token(1, 0xb1, "WBTC")), Some(&token(10, 0xa2, "USDC")))
            .unwrap();

        match tx_type {
            TransactionType::SwapBridge { bridged, .. } => {
                assert_eq!(bridged.chain_id, 1);
                assert_eq!(bridged.address, address(0xa1));
            }
            other => panic!("expected SWAP_BRIDGE, got {:?}", other),
        }
    }

    #[test]
    fn test_superchain_route_preferred_between_members() {
        let registry = registry();
        let tx_type = registry
            .classify(Some(&token(10, 0xc0, "SUPR")), Some(&token(8453, 0xc0, "SUPR")))
            .unwrap();
        assert_eq!(tx_type.protocol(), Some(BridgeProtocol::Superchain));
        assert!(tx_type.with_superchain());
    }

    #[test]
    fn test_native_asset_bridges_over_orbiter() {
        let registry = registry();
        let tx_type = registry
            .classify(Some(&native(1)), Some(&native(8453)))
            .unwrap();
        assert_eq!(tx_type.name(), "BRIDGE");
        assert_eq!(tx_type.protocol(), Some(BridgeProtocol::Orbiter));
    }

    #[test]
    fn test_no_route_between_chains_yields_nothing() {
        let registry = registry();
        // Neither side is bridgeable between 1 and 10
        assert!(registry
            .classify(Some(&token(1, 0xb1, "WBTC")), Some(&token(10, 0xb2, "OP")))
            .is_none());
        // No route touches chain 42161
        assert!(registry
            .classify(Some(&token(1, 0xa1, "USDC")), Some(&token(42161, 0xa3, "USDC")))
            .is_none());
    }

    #[test]
    fn test_every_defined_pair_classifies_to_one_variant() {
        let registry = registry();
        let currencies = [
            token(1, 0xa1, "USDC"),
            token(1, 0xb1, "WBTC"),
            native(1),
            token(10, 0xa2, "USDC"),
            token(10, 0xb2, "OP"),
            token(10, 0xc0, "SUPR"),
            token(8453, 0xc0, "SUPR"),
            native(8453),
        ];

        for currency_in in &currencies {
            for currency_out in &currencies {
                let tx_type = registry.classify(Some(currency_in), Some(currency_out));
                if currency_in.chain_id == currency_out.chain_id {
                    assert_eq!(tx_type.as_ref().map(|t| t.name()), Some("SWAP"));
                }
                if let Some(tx_type) = tx_type {
                    assert_eq!(tx_type.chain_in(), currency_in.chain_id);
                    assert_eq!(tx_type.chain_out(), currency_out.chain_id);
                }
            }
        }
    }

    #[test]
    fn test_registry_from_settings() {
        let settings = Settings::parse(SAMPLE_CONFIG).unwrap();
        let registry = BridgeRegistry::from_settings(&settings).unwrap();

        assert_eq!(registry.routes().len(), 2);
        assert!(registry.is_superchain(10));
        assert!(registry.is_superchain(8453));
        assert!(!registry.is_superchain(1));

        let usdc = registry
            .routes()
            .iter()
            .find(|r| r.asset == "USDC")
            .unwrap();
        assert_eq!(usdc.decimals, 6);
        assert_eq!(
            usdc.router_on(1),
            Some(Address::repeat_byte(0x11))
        );
    }
}
