use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, ParseError};
use crate::model::{Entry, EnvMap, EnvValue, ResolutionMode};

const OPTIONAL_MARKER: &str = "$optional";

/// Parse dotenv entries from text.
pub fn parse_str(input: &str) -> Result<EnvMap, ParseError> {
    parse_str_with_mode(input, ResolutionMode::default())
}

/// Parse dotenv entries from text using a specific reference resolution mode.
pub fn parse_str_with_mode(input: &str, mode: ResolutionMode) -> Result<EnvMap, ParseError> {
    parse_str_with_source(input, None, mode)
}

/// Parse dotenv entries from UTF-8 bytes.
pub fn parse_bytes(input: &[u8]) -> Result<EnvMap, Error> {
    parse_bytes_with_mode(input, ResolutionMode::default())
}

/// Parse dotenv entries from UTF-8 bytes using a specific resolution mode.
pub fn parse_bytes_with_mode(input: &[u8], mode: ResolutionMode) -> Result<EnvMap, Error> {
    let text = std::str::from_utf8(input)?;
    Ok(parse_str_with_mode(text, mode)?)
}

/// Parse dotenv entries from a buffered reader.
pub fn parse_reader<R: BufRead>(reader: R) -> Result<EnvMap, Error> {
    parse_reader_with_mode(reader, ResolutionMode::default())
}

/// Parse dotenv entries from a buffered reader using a specific resolution mode.
pub fn parse_reader_with_mode<R: BufRead>(
    mut reader: R,
    mode: ResolutionMode,
) -> Result<EnvMap, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    parse_bytes_with_mode(&buf, mode)
}

pub(crate) fn parse_str_with_source(
    input: &str,
    source: Option<&Path>,
    mode: ResolutionMode,
) -> Result<EnvMap, ParseError> {
    let mut env = EnvMap::new();
    let mut pending = Vec::new();

    for (idx, line) in input.split('\n').enumerate() {
        let line_num = idx as u32 + 1;
        let Some(assignment) = scan_line(line, line_num)? else {
            continue;
        };

        let mut value = assignment.value;
        if mode == ResolutionMode::Deferred {
            value = substitute_known(&env, assignment.key, value, line_num, &mut pending);
        }

        if assignment.key.is_empty() {
            return Err(ParseError::MissingKey { line: line_num });
        }
        if value.is_empty() && !assignment.optional {
            return Err(ParseError::MissingValue {
                key: assignment.key.to_owned(),
                line: line_num,
            });
        }

        let value = if value.is_empty() {
            EnvValue::Absent
        } else {
            EnvValue::Present(value)
        };
        env.insert(Entry {
            key: assignment.key.to_owned(),
            value,
            source: source.map(Path::to_path_buf),
            line: line_num,
        });
    }

    match mode {
        ResolutionMode::Deferred => resolve_pending(&mut env, pending)?,
        ResolutionMode::Graph => resolve_graph(&mut env)?,
    }

    Ok(env)
}

struct Assignment<'a> {
    key: &'a str,
    value: String,
    optional: bool,
}

/// A `${name}` placeholder whose target had no concrete value when its line
/// was scanned.
#[derive(Debug)]
struct PendingReference {
    owner: String,
    name: String,
    placeholder: String,
    line: u32,
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{(.+?)\}").expect("reference pattern is valid"))
}

fn scan_line(line: &str, line_num: u32) -> Result<Option<Assignment<'_>>, ParseError> {
    if line.starts_with('#') || line.trim().is_empty() {
        return Ok(None);
    }

    let Some((key, rest)) = line.split_once('=') else {
        return Err(ParseError::MissingSeparator { line: line_num });
    };

    let (value, optional) = match rest.split_once('#') {
        Some((head, comment)) => (head, comment.contains(OPTIONAL_MARKER)),
        None => (rest, false),
    };

    Ok(Some(Assignment {
        key: key.trim(),
        value: strip_quotes(value.trim()),
        optional,
    }))
}

/// Remove every single quote, or failing that every double quote. Only one
/// quote style is stripped per value.
fn strip_quotes(value: &str) -> String {
    if value.contains('\'') {
        value.replace('\'', "")
    } else if value.contains('"') {
        value.replace('"', "")
    } else {
        value.to_owned()
    }
}

fn substitute_known(
    env: &EnvMap,
    owner: &str,
    mut value: String,
    line_num: u32,
    pending: &mut Vec<PendingReference>,
) -> String {
    let references: Vec<(String, String)> = reference_pattern()
        .captures_iter(&value)
        .map(|caps| (caps[0].to_owned(), caps[1].to_owned()))
        .collect();

    for (placeholder, name) in references {
        match env.get_str(&name) {
            Some(known) => value = value.replace(&placeholder, known),
            None => pending.push(PendingReference {
                owner: owner.to_owned(),
                name,
                placeholder,
                line: line_num,
            }),
        }
    }

    value
}

fn resolve_pending(env: &mut EnvMap, mut pending: Vec<PendingReference>) -> Result<(), ParseError> {
    if !pending.is_empty() {
        tracing::debug!(count = pending.len(), "resolving deferred references");
    }

    while let Some(reference) = pending.pop() {
        let Some(resolved) = env.get_str(&reference.name).map(str::to_owned) else {
            return Err(ParseError::InvalidReference {
                reference: reference.name,
                line: reference.line,
            });
        };

        if resolved == reference.placeholder {
            return Err(ParseError::CircularReference {
                line: reference.line,
            });
        }

        if let Some(EnvValue::Present(value)) = env.value_mut(&reference.owner) {
            *value = value.replace(&reference.placeholder, &resolved);
        }
    }

    Ok(())
}

fn resolve_graph(env: &mut EnvMap) -> Result<(), ParseError> {
    let resolved: Vec<(String, String)> = GraphResolver::new(env)
        .resolve_all()?
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect();

    for (key, value) in resolved {
        if let Some(EnvValue::Present(slot)) = env.value_mut(&key) {
            *slot = value;
        }
    }

    Ok(())
}

/// Depth-first expansion of every value against the final mapping, driven
/// by an explicit frame stack so chain length is bounded by memory only.
struct GraphResolver<'a> {
    raw: &'a EnvMap,
    resolved: HashMap<&'a str, String>,
    in_progress: HashSet<&'a str>,
    frames: Vec<Frame<'a>>,
}

/// A value being expanded.
struct Frame<'a> {
    key: &'a str,
    line: u32,
    template: &'a str,
    references: Vec<(Range<usize>, &'a str)>,
    next: usize,
    cursor: usize,
    out: String,
}

impl<'a> Frame<'a> {
    fn new(entry: &'a Entry) -> Option<Self> {
        let EnvValue::Present(template) = &entry.value else {
            return None;
        };
        let references = reference_pattern()
            .captures_iter(template)
            .filter_map(|caps| Some((caps.get(0)?.range(), caps.get(1)?.as_str())))
            .collect();

        Some(Self {
            key: &entry.key,
            line: entry.line,
            template,
            references,
            next: 0,
            cursor: 0,
            out: String::with_capacity(template.len()),
        })
    }

    fn splice(&mut self, range: Range<usize>, value: &str) {
        self.out.push_str(&self.template[self.cursor..range.start]);
        self.out.push_str(value);
        self.cursor = range.end;
        self.next += 1;
    }
}

impl<'a> GraphResolver<'a> {
    fn new(raw: &'a EnvMap) -> Self {
        Self {
            raw,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
            frames: Vec::new(),
        }
    }

    fn resolve_all(mut self) -> Result<HashMap<&'a str, String>, ParseError> {
        let raw = self.raw;
        for entry in raw {
            if self.resolved.contains_key(entry.key.as_str()) {
                continue;
            }
            if let Some(frame) = Frame::new(entry) {
                self.push(frame);
                self.drain()?;
            }
        }
        Ok(self.resolved)
    }

    fn push(&mut self, frame: Frame<'a>) {
        self.in_progress.insert(frame.key);
        self.frames.push(frame);
    }

    fn drain(&mut self) -> Result<(), ParseError> {
        let raw = self.raw;
        while let Some(top) = self.frames.len().checked_sub(1) {
            let frame = &self.frames[top];
            let Some((range, name)) = frame.references.get(frame.next).cloned() else {
                self.finish_top();
                continue;
            };
            let line = frame.line;

            if self.in_progress.contains(name) {
                return Err(ParseError::CircularReference { line });
            }
            let Some(target) = raw.entry(name).filter(|entry| !entry.value.is_absent()) else {
                return Err(ParseError::InvalidReference {
                    reference: name.to_owned(),
                    line,
                });
            };

            if let Some(value) = self.resolved.get(name) {
                self.frames[top].splice(range, value);
            } else if let Some(child) = Frame::new(target) {
                self.push(child);
            }
        }
        Ok(())
    }

    fn finish_top(&mut self) {
        let Some(mut frame) = self.frames.pop() else {
            return;
        };
        frame.out.push_str(&frame.template[frame.cursor..]);
        self.in_progress.remove(frame.key);
        self.resolved.insert(frame.key, frame.out);
    }
}
