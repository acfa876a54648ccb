use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Target output sink of the bulk loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriterType {
    /// MeTTa text atoms.
    #[default]
    Metta,
    /// Neo4j CSV + Cypher scripts, imported into a live database.
    Neo4j,
    Mork,
    Networkx,
}

impl WriterType {
    pub const ALL: [WriterType; 4] = [Self::Metta, Self::Neo4j, Self::Mork, Self::Networkx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metta => "metta",
            Self::Neo4j => "neo4j",
            Self::Mork => "mork",
            Self::Networkx => "networkx",
        }
    }

    /// Whether jobs of this type are imported into the live graph database.
    pub fn requires_graph_database(&self) -> bool {
        matches!(self, Self::Neo4j)
    }
}

impl fmt::Display for WriterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriterType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == lowered)
            .ok_or_else(|| SchemaError::UnknownWriterType(s.to_string()))
    }
}
