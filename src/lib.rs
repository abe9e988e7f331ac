//! Parse, validate and load `.env` files with `${KEY}` references and
//! `$optional` values.
//!
//! [`parse_str`] turns text into an ordered [`EnvMap`] without side effects.
//! [`EnvLoader::load`] reads files, validates the merged result and applies it
//! to a [`TargetEnv`], which is an in-memory map unless a process target is
//! requested explicitly.
//!
//! Convenience loaders (`setup`, `from_path`, `from_paths`) mutate the
//! process environment and are `unsafe`, because callers must guarantee no
//! concurrent process-environment access.

mod declaration;
mod env;
mod error;
mod loader;
mod model;
mod parser;
mod validate;

pub use declaration::{
    DEFAULT_METADATA_FILE, DEFAULT_OUTPUT_NAME, DeclarationGenerator, DeclarationOutcome, render,
};
pub use env::TargetEnv;
pub use error::{Error, ParseError, ValidationError};
pub use loader::{
    ACCEPTED_ENV_FILES, EnvLoader, find_accepted_file, from_path, from_paths, setup,
};
pub use model::{Encoding, Entry, EnvMap, EnvValue, LoadReport, LoadedEnv, ResolutionMode};
pub use parser::{
    parse_bytes, parse_bytes_with_mode, parse_reader, parse_reader_with_mode, parse_str,
    parse_str_with_mode,
};
pub use validate::{KeyValidators, Rule, Validate, ValueValidator};
