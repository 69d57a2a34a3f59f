/*! Parse `.ool` text into programs.
 *
 * The text format describes classes, interfaces, members with their OO attributes, static data
 * and function bodies. `parse` only checks syntax; `parse_program` resolves names and builds a
 * `Program`, recording attributes and call-site overrides in the given session.
 */

#![allow(unreachable_patterns)]

use oolower_core::{OoSession, Program};
use pest::Parser;
use pest_derive::Parser;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod error;
pub mod reader;

pub use error::ParseError;
pub use reader::ProgramReader;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct OolParser;

pub type ParseResult<T> = Result<T, Box<pest::error::Error<Rule>>>;

pub const SOURCE_EXTENSION: &str = "ool";

pub fn parse(input: &str) -> ParseResult<pest::iterators::Pairs<'_, Rule>> {
    OolParser::parse(Rule::program, input).map_err(Box::new)
}

pub fn check(input: &str) -> bool {
    parse(input).is_ok()
}

pub fn parse_program(input: &str, session: &mut OoSession) -> Result<Program, ParseError> {
    ProgramReader::new(session).read(input)
}

pub fn parse_program_file<P: AsRef<Path>>(path: P, session: &mut OoSession) -> Result<Program, ParseError> {
    let path = path.as_ref();
    let input = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_program(&input, session)
}

/// `.ool` files below `root`, sorted by path.
pub fn find_sources<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|ext| ext == SOURCE_EXTENSION).unwrap_or(false))
        .collect();
    sources.sort();
    sources
}
