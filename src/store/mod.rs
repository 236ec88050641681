// Store Layer - Project Maester
// "Three keeps, three gates, one watchful eye"

mod adapter;
mod client;
mod memory;

#[cfg(test)]
mod tests;

pub use adapter::{AdapterStatus, StoreAdapter, StoreAdapterConfig, StoreHealth};
pub use client::StoreClient;
pub use memory::MemoryStoreClient;

use serde::{Deserialize, Serialize};

/// Identifier for one of the three data stores
///
/// `Auth` holds credentials, `Academic` holds academic records (careers,
/// cycles, students, the Course master half and the Teacher reference half),
/// `Profiles` holds instructor profiles (the Teacher master half and the
/// Course reference half).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreId {
    Auth,
    Academic,
    Profiles,
}

impl StoreId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Academic => "academic",
            Self::Profiles => "profiles",
        }
    }

    /// All stores in probe order
    pub fn all() -> [StoreId; 3] {
        [Self::Auth, Self::Academic, Self::Profiles]
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
