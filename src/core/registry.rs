//! Catalog of the sources a feed can bind to

use super::feed::{SourceBinding, SourceKind};

/// Number of catalog entries bound to a fresh feed.
pub const DEFAULT_SOURCE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub kind: SourceKind,
    pub default_weight: f64,
}

impl SourceDescriptor {
    pub fn to_binding(&self) -> SourceBinding {
        SourceBinding {
            id: self.id.to_string(),
            name: self.display_name.to_string(),
            kind: self.kind,
            enabled: true,
            weight: self.default_weight,
        }
    }
}

const BUILTIN: &[SourceDescriptor] = &[
    SourceDescriptor {
        id: "coingecko",
        display_name: "CoinGecko",
        kind: SourceKind::Api,
        default_weight: 1.0,
    },
    SourceDescriptor {
        id: "binance",
        display_name: "Binance",
        kind: SourceKind::Api,
        default_weight: 1.0,
    },
    SourceDescriptor {
        id: "coinbase",
        display_name: "Coinbase",
        kind: SourceKind::Api,
        default_weight: 1.0,
    },
    SourceDescriptor {
        id: "kraken",
        display_name: "Kraken",
        kind: SourceKind::Api,
        default_weight: 1.0,
    },
    SourceDescriptor {
        id: "pyth",
        display_name: "Pyth Network",
        kind: SourceKind::OnChain,
        default_weight: 1.0,
    },
    SourceDescriptor {
        id: "chainlink",
        display_name: "Chainlink",
        kind: SourceKind::OnChain,
        default_weight: 1.0,
    },
];

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    entries: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN.to_vec())
    }

    pub fn from_entries(entries: Vec<SourceDescriptor>) -> Self {
        SourceRegistry { entries }
    }

    pub fn list(&self) -> &[SourceDescriptor] {
        &self.entries
    }

    pub fn resolve(&self, id: &str) -> Option<&SourceDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    /// Fills the display name and kind of bindings given only by id.
    /// Unknown ids fall back to the id as name.
    pub fn complete(&self, bindings: &mut [SourceBinding]) {
        for binding in bindings.iter_mut().filter(|b| b.name.is_empty()) {
            match self.resolve(&binding.id) {
                Some(descriptor) => {
                    binding.name = descriptor.display_name.to_string();
                    binding.kind = descriptor.kind;
                }
                None => binding.name = binding.id.clone(),
            }
        }
    }

    pub fn default_bindings(&self) -> Vec<SourceBinding> {
        self.entries
            .iter()
            .take(DEFAULT_SOURCE_COUNT)
            .map(SourceDescriptor::to_binding)
            .collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
