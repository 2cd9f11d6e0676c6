// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Analysis options.

use std::collections::HashMap;
use std::path::PathBuf;

use log::*;

/// The flavor of context sensitivity used by the pointer analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PtaType {
    Insensitive,
    CallSiteSensitive,
    ObjectSensitive,
}

/// Options recognized by the analyses, built from a string-keyed map.
///
/// Unrecognized keys and unparsable values are logged and ignored; the
/// analyses proceed with defaults.
#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    /// Path to the declarative taint policy (sources, sinks, transfers).
    pub taint_config: Option<PathBuf>,
    /// Identifier of a previously computed pointer analysis result,
    /// consumed by the interprocedural constant propagation.
    pub pta: Option<String>,
    /// Context depth limit for the k-limited selectors.
    pub context_depth: usize,
    pub pta_type: PtaType,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            taint_config: None,
            pta: None,
            context_depth: 1,
            pta_type: PtaType::CallSiteSensitive,
        }
    }
}

impl AnalysisOptions {
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut options = AnalysisOptions::default();
        for (key, value) in map {
            match key.as_str() {
                "taint-config" => options.taint_config = Some(PathBuf::from(value)),
                "pta" => options.pta = Some(value.clone()),
                "context-depth" => match value.parse::<usize>() {
                    Ok(depth) => options.context_depth = depth,
                    Err(_) => warn!("Invalid context-depth value: {}", value),
                },
                "pta-type" => match value.as_str() {
                    "insensitive" | "ci" => options.pta_type = PtaType::Insensitive,
                    "callsite" | "cs" => options.pta_type = PtaType::CallSiteSensitive,
                    "object" | "obj" => options.pta_type = PtaType::ObjectSensitive,
                    other => warn!("Unknown pta-type: {}", other),
                },
                other => warn!("Unrecognized analysis option: {}", other),
            }
        }
        options
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognized_keys() {
        let mut map = HashMap::new();
        map.insert("taint-config".to_string(), "taint.yml".to_string());
        map.insert("pta".to_string(), "cs-pta".to_string());
        map.insert("context-depth".to_string(), "2".to_string());
        map.insert("pta-type".to_string(), "object".to_string());
        let options = AnalysisOptions::from_map(&map);
        assert_eq!(options.taint_config, Some(PathBuf::from("taint.yml")));
        assert_eq!(options.pta.as_deref(), Some("cs-pta"));
        assert_eq!(options.context_depth, 2);
        assert_eq!(options.pta_type, PtaType::ObjectSensitive);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut map = HashMap::new();
        map.insert("no-such-option".to_string(), "1".to_string());
        let options = AnalysisOptions::from_map(&map);
        assert_eq!(options.context_depth, 1);
        assert_eq!(options.pta_type, PtaType::CallSiteSensitive);
    }
}
