//! Operator intent: which upstream ASNs should carry each prefix
//!
//! The intent file is a flat mapping from prefix to a list of AS numbers:
//!
//! ```yaml
//! 1.2.3.0/24: [3257, 6939]
//! 2001:db8::/32:
//!   - 3257
//! ```
//!
//! JSON files (`.json`) with the same shape are accepted too.

use ipnet::IpNet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::IntentLoadError;

/// Declared prefix to expected next-hop ASNs
///
/// Upstream order is kept for display; comparisons are set-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub prefixes: BTreeMap<IpNet, Vec<u32>>,
}

impl Intent {
    pub fn expected(&self, prefix: &IpNet) -> Option<&[u32]> {
        self.prefixes.get(prefix).map(|v| v.as_slice())
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &IpNet> {
        self.prefixes.keys()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl FromIterator<(IpNet, Vec<u32>)> for Intent {
    fn from_iter<T: IntoIterator<Item = (IpNet, Vec<u32>)>>(iter: T) -> Self {
        Intent {
            prefixes: iter.into_iter().map(|(p, asns)| (p.trunc(), asns)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentFormat {
    Yaml,
    Json,
}

impl IntentFormat {
    /// `.json` is JSON, anything else is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => IntentFormat::Json,
            _ => IntentFormat::Yaml,
        }
    }
}

/// A key and its upstream list before validation
type RawEntry = (String, Result<Vec<u32>, String>);

pub struct IntentStore;

impl IntentStore {
    /// Load and validate the intent file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Intent, IntentLoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| IntentLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let intent = Self::parse(&text, IntentFormat::from_path(path), path)?;
        info!(
            "loaded intent for {} prefixes from {}",
            intent.len(),
            path.display()
        );
        Ok(intent)
    }

    /// Validate intent text; `path` is only used in error messages
    pub fn parse(text: &str, format: IntentFormat, path: &Path) -> Result<Intent, IntentLoadError> {
        let malformed = |message: String| IntentLoadError::Malformed {
            path: path.to_path_buf(),
            message,
        };

        let entries = match format {
            IntentFormat::Yaml => yaml_entries(text),
            IntentFormat::Json => json_entries(text),
        }
        .map_err(malformed)?;

        let mut prefixes: BTreeMap<IpNet, Vec<u32>> = BTreeMap::new();
        let mut seen_as: BTreeMap<IpNet, String> = BTreeMap::new();

        for (key, upstreams) in entries {
            let prefix = key
                .trim()
                .parse::<IpNet>()
                .map_err(|e| IntentLoadError::InvalidPrefix {
                    path: path.to_path_buf(),
                    prefix: key.clone(),
                    message: e.to_string(),
                })?
                .trunc();

            let upstreams = upstreams.map_err(|message| IntentLoadError::InvalidUpstreams {
                path: path.to_path_buf(),
                prefix: key.clone(),
                message,
            })?;
            if upstreams.is_empty() {
                return Err(IntentLoadError::InvalidUpstreams {
                    path: path.to_path_buf(),
                    prefix: key,
                    message: "at least one upstream AS is required".to_string(),
                });
            }

            if let Some(first) = seen_as.get(&prefix) {
                return Err(IntentLoadError::DuplicatePrefix {
                    path: path.to_path_buf(),
                    first: first.clone(),
                    second: key,
                });
            }

            let mut unique = Vec::with_capacity(upstreams.len());
            for asn in upstreams {
                if !unique.contains(&asn) {
                    unique.push(asn);
                }
            }
            seen_as.insert(prefix, key);
            prefixes.insert(prefix, unique);
        }

        if prefixes.is_empty() {
            return Err(IntentLoadError::Empty {
                path: path.to_path_buf(),
            });
        }

        Ok(Intent { prefixes })
    }
}

fn check_asn(value: Option<u64>, shown: impl std::fmt::Display) -> Result<u32, String> {
    value
        .filter(|v| *v >= 1)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("{} is not an AS number (1-4294967295)", shown))
}

fn yaml_entries(text: &str) -> Result<Vec<RawEntry>, String> {
    use serde_yaml::Value;

    // comments only
    if text
        .lines()
        .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
    {
        return Ok(vec![]);
    }

    let value: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    let mapping = match value {
        Value::Mapping(m) => m,
        Value::Null => return Ok(vec![]),
        other => return Err(format!("expected a mapping, found {}", yaml_kind(&other))),
    };

    mapping
        .into_iter()
        .map(|(key, upstreams)| {
            let key = match key {
                Value::String(s) => s,
                other => {
                    return Err(format!(
                        "prefix keys must be strings, found {}",
                        yaml_kind(&other)
                    ))
                }
            };
            let upstreams: Result<Vec<u32>, String> = match upstreams {
                Value::Sequence(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) => check_asn(n.as_u64(), n),
                        other => Err(format!("{} is not an AS number", yaml_kind(other))),
                    })
                    .collect(),
                other => Err(format!(
                    "expected a list of AS numbers, found {}",
                    yaml_kind(&other)
                )),
            };
            Ok((key, upstreams))
        })
        .collect()
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    use serde_yaml::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn json_entries(text: &str) -> Result<Vec<RawEntry>, String> {
    use serde_json::Value;

    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let Value::Object(map) = value else {
        return Err("expected a JSON object".to_string());
    };

    Ok(map
        .into_iter()
        .map(|(key, upstreams)| {
            let upstreams: Result<Vec<u32>, String> = match upstreams {
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) => check_asn(n.as_u64(), n),
                        other => Err(format!("{} is not an AS number", other)),
                    })
                    .collect(),
                other => Err(format!("expected a list of AS numbers, found {}", other)),
            };
            (key, upstreams)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_yaml(text: &str) -> Result<Intent, IntentLoadError> {
        IntentStore::parse(text, IntentFormat::Yaml, Path::new("route_intent.yaml"))
    }

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("route_intent.yaml");
        fs::write(
            &path,
            "# transit for the main site\n1.2.3.0/24: [6461, 3356]\n2001:db8::/32:\n  - 3257\n",
        )
        .unwrap();

        let intent = IntentStore::load(&path).unwrap();
        assert_eq!(intent.len(), 2);
        assert_eq!(intent.expected(&net("1.2.3.0/24")), Some(&[6461, 3356][..]));
        assert_eq!(intent.expected(&net("2001:db8::/32")), Some(&[3257][..]));
        // IPv4 sorts before IPv6
        assert_eq!(intent.prefixes().next(), Some(&net("1.2.3.0/24")));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent.json");
        fs::write(&path, r#"{"1.2.3.0/24": [3356, 6461], "1.2.4.0/24": [174]}"#).unwrap();

        let intent = IntentStore::load(&path).unwrap();
        assert_eq!(intent.expected(&net("1.2.4.0/24")), Some(&[174][..]));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IntentStore::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, IntentLoadError::Read { .. }));
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn test_prefixes_are_normalized() {
        let intent = parse_yaml("1.2.3.77/24: [3356]\n").unwrap();
        assert_eq!(intent.expected(&net("1.2.3.0/24")), Some(&[3356][..]));
    }

    #[test]
    fn test_duplicate_after_normalization() {
        let err = parse_yaml("1.2.3.0/24: [3356]\n1.2.3.1/24: [174]\n").unwrap_err();
        match err {
            IntentLoadError::DuplicatePrefix { first, second, .. } => {
                assert_eq!(first, "1.2.3.0/24");
                assert_eq!(second, "1.2.3.1/24");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_prefix() {
        let err = parse_yaml("1.2.3/24: [3356]\n").unwrap_err();
        assert!(matches!(
            err,
            IntentLoadError::InvalidPrefix { ref prefix, .. } if prefix == "1.2.3/24"
        ));
    }

    #[test]
    fn test_invalid_upstreams() {
        for text in [
            "1.2.3.0/24: []\n",
            "1.2.3.0/24: [0]\n",
            "1.2.3.0/24: [-5]\n",
            "1.2.3.0/24: [4294967296]\n",
            "1.2.3.0/24: [AS3356]\n",
            "1.2.3.0/24: 3356\n",
            "1.2.3.0/24:\n",
        ] {
            let err = parse_yaml(text).unwrap_err();
            assert!(
                matches!(err, IntentLoadError::InvalidUpstreams { .. }),
                "{text:?} gave {err}"
            );
        }
        // the largest 32-bit ASN is fine
        assert!(parse_yaml("1.2.3.0/24: [4294967295]\n").is_ok());
    }

    #[test]
    fn test_malformed_structure() {
        assert!(matches!(
            parse_yaml("- 1.2.3.0/24\n- 3356\n"),
            Err(IntentLoadError::Malformed { .. })
        ));
        assert!(matches!(
            parse_yaml("1.2.3.0/24: [3356\n"),
            Err(IntentLoadError::Malformed { .. })
        ));
        assert!(matches!(
            IntentStore::parse("[1, 2]", IntentFormat::Json, Path::new("i.json")),
            Err(IntentLoadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_empty_intent() {
        assert!(matches!(parse_yaml(""), Err(IntentLoadError::Empty { .. })));
        assert!(matches!(parse_yaml("{}\n"), Err(IntentLoadError::Empty { .. })));
    }

    #[test]
    fn test_duplicate_upstreams_collapse() {
        let intent = parse_yaml("1.2.3.0/24: [3356, 6461, 3356]\n").unwrap();
        assert_eq!(intent.expected(&net("1.2.3.0/24")), Some(&[3356, 6461][..]));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(IntentFormat::from_path(Path::new("a.JSON")), IntentFormat::Json);
        assert_eq!(IntentFormat::from_path(Path::new("a.yml")), IntentFormat::Yaml);
        assert_eq!(IntentFormat::from_path(Path::new("intent")), IntentFormat::Yaml);
    }
}
