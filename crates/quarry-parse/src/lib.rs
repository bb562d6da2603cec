mod languages;
mod parser;

pub use parser::{EXCERPT_MAX_CHARS, ParseError, ParserStrategy, SymbolParser};
