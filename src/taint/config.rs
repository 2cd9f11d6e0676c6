// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The declarative taint policy: sources, sinks, and transfers.
//!
//! The policy is a YAML document. Methods are written `Class.name`; the
//! endpoints of a transfer accept `base`, `result`, or a non-negative
//! argument index (the numeric encodings `-1` and `-2` are also accepted).
//! Entries naming unknown classes, methods, or types are logged and
//! dropped; a policy that fails to read or parse as a whole is a
//! [`ConfigError`].

use std::fs;
use std::path::Path;

use log::*;
use serde::Deserialize;
use thiserror::Error;

use crate::ir::{MethodId, Program, TypeId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read taint config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed taint config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// An endpoint of a taint transfer.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TransferPoint {
    Base,
    Result,
    Arg(usize),
}

impl TransferPoint {
    /// Numeric encoding of `base` by convention.
    pub const BASE: i64 = -1;
    /// Numeric encoding of `result` by convention.
    pub const RESULT: i64 = -2;
}

#[derive(Copy, Clone, Debug)]
pub struct Source {
    pub method: MethodId,
    pub ty: TypeId,
}

#[derive(Copy, Clone, Debug)]
pub struct Sink {
    pub method: MethodId,
    pub index: usize,
}

#[derive(Copy, Clone, Debug)]
pub struct TaintTransfer {
    pub method: MethodId,
    pub from: TransferPoint,
    pub to: TransferPoint,
}

#[derive(Debug, Default)]
pub struct TaintConfig {
    sources: Vec<Source>,
    sinks: Vec<Sink>,
    transfers: Vec<TaintTransfer>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    sinks: Vec<RawSink>,
    #[serde(default)]
    transfers: Vec<RawTransfer>,
}

#[derive(Deserialize)]
struct RawSource {
    method: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Deserialize)]
struct RawSink {
    method: String,
    index: usize,
}

#[derive(Deserialize)]
struct RawTransfer {
    method: String,
    from: RawEndpoint,
    to: RawEndpoint,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEndpoint {
    Index(i64),
    Named(String),
}

fn resolve_method(prog: &Program, name: &str) -> Option<MethodId> {
    let (class_name, method_name) = name.rsplit_once('.')?;
    let class = prog.class_by_name(class_name)?;
    prog.class(class).methods.get(method_name).copied()
}

fn resolve_endpoint(raw: &RawEndpoint) -> Option<TransferPoint> {
    match raw {
        RawEndpoint::Index(i) if *i == TransferPoint::BASE => Some(TransferPoint::Base),
        RawEndpoint::Index(i) if *i == TransferPoint::RESULT => Some(TransferPoint::Result),
        RawEndpoint::Index(i) if *i >= 0 => Some(TransferPoint::Arg(*i as usize)),
        RawEndpoint::Index(_) => None,
        RawEndpoint::Named(name) => match name.as_str() {
            "base" => Some(TransferPoint::Base),
            "result" => Some(TransferPoint::Result),
            _ => name.parse::<usize>().ok().map(TransferPoint::Arg),
        },
    }
}

impl TaintConfig {
    pub fn empty() -> Self {
        TaintConfig::default()
    }

    pub fn load(path: &Path, prog: &Program) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, prog)
    }

    pub fn parse(text: &str, prog: &Program) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        let mut config = TaintConfig::default();
        for source in &raw.sources {
            let Some(method) = resolve_method(prog, &source.method) else {
                warn!("Skipping taint source with unknown method: {}", source.method);
                continue;
            };
            let Some(ty) = prog.type_by_name(&source.ty) else {
                warn!("Skipping taint source with unknown type: {}", source.ty);
                continue;
            };
            config.sources.push(Source { method, ty });
        }
        for sink in &raw.sinks {
            let Some(method) = resolve_method(prog, &sink.method) else {
                warn!("Skipping taint sink with unknown method: {}", sink.method);
                continue;
            };
            config.sinks.push(Sink {
                method,
                index: sink.index,
            });
        }
        for transfer in &raw.transfers {
            let Some(method) = resolve_method(prog, &transfer.method) else {
                warn!("Skipping taint transfer with unknown method: {}", transfer.method);
                continue;
            };
            let (Some(from), Some(to)) = (resolve_endpoint(&transfer.from), resolve_endpoint(&transfer.to))
            else {
                warn!("Skipping taint transfer with invalid endpoint on {}", transfer.method);
                continue;
            };
            config.transfers.push(TaintTransfer { method, from, to });
        }
        info!(
            "Loaded taint config: {} sources, {} sinks, {} transfers",
            config.sources.len(),
            config.sinks.len(),
            config.transfers.len()
        );
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.sinks.is_empty() && self.transfers.is_empty()
    }

    pub fn sources_of(&self, method: MethodId) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(move |s| s.method == method)
    }

    pub fn sinks_of(&self, method: MethodId) -> impl Iterator<Item = &Sink> {
        self.sinks.iter().filter(move |s| s.method == method)
    }

    pub fn transfers_of(&self, method: MethodId) -> impl Iterator<Item = &TaintTransfer> {
        self.transfers.iter().filter(move |t| t.method == method)
    }

    /// Adds a source rule directly, bypassing the document form.
    pub fn add_source(&mut self, method: MethodId, ty: TypeId) {
        self.sources.push(Source { method, ty });
    }

    pub fn add_sink(&mut self, method: MethodId, index: usize) {
        self.sinks.push(Sink { method, index });
    }

    pub fn add_transfer(&mut self, method: MethodId, from: TransferPoint, to: TransferPoint) {
        self.transfers.push(TaintTransfer { method, from, to });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_program() -> Program {
        let mut prog = Program::new();
        let string = prog.add_class("String", None);
        prog.add_method(string, "concat", false);
        let secret = prog.add_class("Secret", None);
        prog.add_method(secret, "readSecret", true);
        let log = prog.add_class("Log", None);
        prog.add_method(log, "log", true);
        prog
    }

    #[test]
    fn parses_and_resolves_entries() {
        let prog = sample_program();
        let text = r#"
sources:
  - { method: "Secret.readSecret", type: "String" }
sinks:
  - { method: "Log.log", index: 0 }
transfers:
  - { method: "String.concat", from: base, to: result }
  - { method: "String.concat", from: 0, to: result }
"#;
        let config = TaintConfig::parse(text, &prog).unwrap();
        let read_secret = prog.class(prog.class_by_name("Secret").unwrap()).methods["readSecret"];
        let concat = prog.class(prog.class_by_name("String").unwrap()).methods["concat"];
        assert_eq!(config.sources_of(read_secret).count(), 1);
        let transfers: Vec<_> = config.transfers_of(concat).collect();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].from, TransferPoint::Base);
        assert_eq!(transfers[1].from, TransferPoint::Arg(0));
        assert_eq!(transfers[1].to, TransferPoint::Result);
    }

    #[test]
    fn unknown_methods_are_skipped() {
        let prog = sample_program();
        let text = r#"
sources:
  - { method: "Nope.missing", type: "String" }
sinks:
  - { method: "Log.log", index: 1 }
"#;
        let config = TaintConfig::parse(text, &prog).unwrap();
        assert_eq!(config.sources.len(), 0);
        assert_eq!(config.sinks.len(), 1);
    }

    #[test]
    fn numeric_endpoint_conventions() {
        let prog = sample_program();
        let text = r#"
transfers:
  - { method: "String.concat", from: -1, to: -2 }
"#;
        let config = TaintConfig::parse(text, &prog).unwrap();
        let concat = prog.class(prog.class_by_name("String").unwrap()).methods["concat"];
        let transfers: Vec<_> = config.transfers_of(concat).collect();
        assert_eq!(transfers[0].from, TransferPoint::Base);
        assert_eq!(transfers[0].to, TransferPoint::Result);
    }

    #[test]
    fn whole_document_failure_is_an_error() {
        let prog = sample_program();
        assert!(TaintConfig::parse("sources: {not-a-list: 1}", &prog).is_err());
    }
}
