use std::fmt;

use serde::{Deserialize, Serialize};

/// How a solder edge delivers items into its destination input wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolderType {
    /// `put`: wait for capacity.
    #[default]
    Put,
    /// `offer`: drop the item if the destination is at capacity.
    Offer,
    /// `inject`: ignore capacity.
    Inject,
}

impl fmt::Display for SolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Put => "PUT",
            Self::Offer => "OFFER",
            Self::Inject => "INJECT",
        })
    }
}
