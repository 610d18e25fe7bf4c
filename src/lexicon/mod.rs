//! English lexical services: corpus frequency ranks and WordNet-style relations.

pub mod frequency;
pub mod relations;

pub use frequency::{FrequencyLevel, FrequencyTable};
pub use relations::{LexicalRelations, Lexicon};
