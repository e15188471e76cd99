use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Stable unique identifier of an ontology term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Iri(String);

impl Iri {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Iri {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty() && !normalized.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(PipelineError::InvalidIri(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Canonical ontology term record, persisted into the `terms` table.
///
/// `mesh_ref` is always materialized (possibly empty); every other field
/// except `iri` defaults to absent when the source omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub iri: Iri,
    pub label: Option<String>,
    pub short_form: Option<String>,
    pub ontology_name: Option<String>,
    pub synonyms: Option<Vec<String>>,
    pub parent_url: Option<String>,
    pub mesh_ref: Vec<String>,
}

/// Directed child-to-parent relationship, persisted into `terms_parents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentEdge {
    pub iri: Iri,
    pub label: Option<String>,
    pub short_form: Option<String>,
    pub ontology_name: Option<String>,
    pub child_iri: Iri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    Merge,
    Replace,
    Append,
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteDisposition::Merge => write!(f, "merge"),
            WriteDisposition::Replace => write!(f, "replace"),
            WriteDisposition::Append => write!(f, "append"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemaContract {
    Evolve,
    Freeze,
    Discard,
}

impl fmt::Display for SchemaContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaContract::Evolve => write!(f, "evolve"),
            SchemaContract::Freeze => write!(f, "freeze"),
            SchemaContract::Discard => write!(f, "discard"),
        }
    }
}
