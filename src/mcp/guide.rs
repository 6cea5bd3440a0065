//! Built-in reference for interpreting Asrai indicators. Free to call.

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Deserialize)]
struct IndicatorGuide {
    /// One line per indicator
    summary: Map<String, Value>,
    /// `what_it_is`, `key_fields` and `how_to_interpret` per indicator
    guide: Map<String, Value>,
}

static GUIDE: Lazy<IndicatorGuide> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../assets/indicator_guide.json")).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Embedded indicator guide is invalid");
        IndicatorGuide {
            summary: Map::new(),
            guide: Map::new(),
        }
    })
});

/// Indicator names in guide order
pub fn names() -> impl Iterator<Item = &'static str> {
    GUIDE.guide.keys().map(String::as_str)
}

fn find(query: &str) -> Option<&'static str> {
    let query = query.to_lowercase();
    let keys = || names();
    keys()
        .find(|k| k.to_lowercase() == query)
        .or_else(|| keys().find(|k| k.to_lowercase().starts_with(&query)))
        .or_else(|| keys().find(|k| k.to_lowercase().contains(&query)))
}

/// Look up the guide.
///
/// `""` or `list` gives the one-line summaries, `all` the full guide, and
/// anything else the first indicator matching by name, prefix, then substring.
pub fn lookup(indicator: &str) -> Option<Value> {
    let indicator = indicator.trim();
    if indicator.is_empty() || indicator.eq_ignore_ascii_case("list") {
        return Some(json!({
            "usage": "Call indicator_guide('<name>') for full details on any indicator.",
            "indicators": GUIDE.summary,
        }));
    }
    if indicator.eq_ignore_ascii_case("all") {
        return Some(Value::Object(GUIDE.guide.clone()));
    }

    find(indicator).map(|key| {
        let mut found = Map::new();
        found.insert(key.to_string(), GUIDE.guide[key].clone());
        Value::Object(found)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_guide_is_complete() {
        assert_eq!(names().count(), 17);
        assert_eq!(GUIDE.summary.len(), 17);
        for name in names() {
            let entry = &GUIDE.guide[name];
            assert!(entry.get("what_it_is").is_some(), "{name} lacks what_it_is");
        }
        assert!(GUIDE.guide["Market_Indicators"].get("indicators").is_some());
    }

    #[test]
    fn test_list_is_default() {
        let list = lookup("").unwrap();
        assert_eq!(list, lookup("LIST").unwrap());
        assert_eq!(list["indicators"].as_object().unwrap().len(), 17);
        assert!(list["usage"].as_str().unwrap().contains("indicator_guide"));
    }

    #[test]
    fn test_all() {
        let all = lookup("all").unwrap();
        let first = all.as_object().unwrap().keys().next().unwrap().clone();
        assert_eq!(first, "ALSAT");
    }

    #[test]
    fn test_match_order() {
        // exact match beats prefix: "alsat" must not resolve to "SuperALSAT"
        assert!(lookup("alsat").unwrap().get("ALSAT").is_some());
        // prefix
        assert!(lookup("ichi").unwrap().get("Ichimoku").is_some());
        // substring
        assert!(lookup("wave").unwrap().get("Elliott_Wave").is_some());
    }

    #[test]
    fn test_unknown() {
        assert!(lookup("stochastic").is_none());
    }
}
