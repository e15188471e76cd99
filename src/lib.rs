//! Incremental ingestion of EFO ontology terms from the OLS REST API into a
//! local analytical warehouse, deriving the child-to-parent term graph along
//! the way.

pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod load;
pub mod normalize;
pub mod ols;
pub mod output;
pub mod parents;
pub mod pipeline;
pub mod warehouse;
