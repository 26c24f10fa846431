//! Display names for upstream ASNs and operator prefixes
//!
//! Names are cosmetic: they decorate rendered output and never take part in
//! classification.

use anyhow::{anyhow, Result};
use ipnet::IpNet;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Translations {
    asns: BTreeMap<u32, String>,
    prefixes: BTreeMap<IpNet, String>,
}

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the string-keyed tables found in the config file.
    ///
    /// Prefix keys are normalized so `1.2.3.4/24` names `1.2.3.0/24`.
    pub fn from_tables(
        asn_names: &HashMap<String, String>,
        prefix_names: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut translations = Self::new();
        for (asn, name) in asn_names {
            let asn = asn
                .trim()
                .trim_start_matches("AS")
                .trim_start_matches("as")
                .parse::<u32>()
                .map_err(|_| anyhow!("invalid AS number '{}' in [asn_names]", asn))?;
            translations = translations.with_asn(asn, name);
        }
        for (prefix, name) in prefix_names {
            let prefix = prefix
                .trim()
                .parse::<IpNet>()
                .map_err(|e| anyhow!("invalid prefix '{}' in [prefix_names]: {}", prefix, e))?;
            translations = translations.with_prefix(prefix, name);
        }
        Ok(translations)
    }

    pub fn with_asn(mut self, asn: u32, name: &str) -> Self {
        self.asns.insert(asn, name.to_string());
        self
    }

    pub fn with_prefix(mut self, prefix: IpNet, name: &str) -> Self {
        self.prefixes.insert(prefix.trunc(), name.to_string());
        self
    }

    pub fn asn_name(&self, asn: u32) -> Option<&str> {
        self.asns.get(&asn).map(|s| s.as_str())
    }

    pub fn prefix_name(&self, prefix: &IpNet) -> Option<&str> {
        self.prefixes.get(&prefix.trunc()).map(|s| s.as_str())
    }

    /// `3257 (GTT)` when a name is known, `3257` otherwise
    pub fn asn_label(&self, asn: u32) -> String {
        match self.asn_name(asn) {
            Some(name) => format!("{} ({})", asn, name),
            None => asn.to_string(),
        }
    }

    /// `1.2.3.0/24 (MY_SITE)` when a name is known
    pub fn prefix_label(&self, prefix: &IpNet) -> String {
        match self.prefix_name(prefix) {
            Some(name) => format!("{} ({})", prefix, name),
            None => prefix.to_string(),
        }
    }

    /// Comma-separated labels for a set of ASNs
    pub fn asn_list<'a>(&self, asns: impl IntoIterator<Item = &'a u32>) -> String {
        itertools::join(asns.into_iter().map(|asn| self.asn_label(*asn)), ", ")
    }

    pub fn is_empty(&self) -> bool {
        self.asns.is_empty() && self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let names = Translations::new()
            .with_asn(3257, "GTT")
            .with_asn(6939, "HURRICANE")
            .with_prefix("1.2.3.0/24".parse().unwrap(), "MY_SITE");

        assert_eq!(names.asn_label(3257), "3257 (GTT)");
        assert_eq!(names.asn_label(174), "174");
        assert_eq!(names.asn_list(&[6939, 174]), "6939 (HURRICANE), 174");
        assert_eq!(
            names.prefix_label(&"1.2.3.0/24".parse().unwrap()),
            "1.2.3.0/24 (MY_SITE)"
        );
        assert_eq!(names.prefix_label(&"2001:db8::/32".parse().unwrap()), "2001:db8::/32");
    }

    #[test]
    fn test_from_tables_normalizes_keys() {
        let asns = HashMap::from([("AS3257".to_string(), "GTT".to_string())]);
        let prefixes = HashMap::from([("1.2.3.7/24".to_string(), "MY_SITE".to_string())]);

        let names = Translations::from_tables(&asns, &prefixes).unwrap();
        assert_eq!(names.asn_name(3257), Some("GTT"));
        assert_eq!(
            names.prefix_name(&"1.2.3.0/24".parse().unwrap()),
            Some("MY_SITE")
        );
    }

    #[test]
    fn test_from_tables_rejects_garbage() {
        let bad_asn = HashMap::from([("gtt".to_string(), "GTT".to_string())]);
        assert!(Translations::from_tables(&bad_asn, &HashMap::new()).is_err());

        let bad_prefix = HashMap::from([("1.2.3/24".to_string(), "X".to_string())]);
        assert!(Translations::from_tables(&HashMap::new(), &bad_prefix).is_err());
    }
}
