//! Structured IRC messages and the line grammar.

mod nom_parser;
mod parse;
mod serialize;
pub mod tags;
mod types;

pub use self::nom_parser::{DetailedParseError, ParsedMessage};
pub use self::types::{Message, Tag};
