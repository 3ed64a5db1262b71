use std::borrow::Cow;

use crate::value::FlagSet;

/// Combines fetched flags with the configured defaults.
///
/// Per key:
/// - missing from `fetched` → default
/// - `Null` in `fetched` with a default → default
/// - `Null` in `fetched` without a default → `Null`
/// - any other fetched value wins
///
/// When `fetched` already carries a non-null value for every default it is
/// returned borrowed, so callers can tell nothing changed. With nothing
/// fetched the defaults are returned borrowed.
pub fn merge<'a>(fetched: Option<&'a FlagSet>, defaults: &'a FlagSet) -> Cow<'a, FlagSet> {
    let Some(fetched) = fetched else {
        return Cow::Borrowed(defaults);
    };

    let complete = defaults
        .keys()
        .all(|key| fetched.get(key).is_some_and(|v| !v.is_null()));
    if complete {
        return Cow::Borrowed(fetched);
    }

    let mut merged = fetched.clone();
    for (key, default) in defaults {
        match merged.get(key) {
            Some(v) if !v.is_null() => {}
            _ => {
                merged.insert(key.clone(), default.clone());
            }
        }
    }
    Cow::Owned(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FlagValue;

    fn flags(pairs: &[(&str, FlagValue)]) -> FlagSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_null_is_filled_from_defaults() {
        let defaults = flags(&[("size", "large".into())]);
        let fetched = flags(&[("size", FlagValue::Null)]);
        assert_eq!(*merge(Some(&fetched), &defaults), defaults);
    }

    #[test]
    fn test_fetched_value_wins() {
        let defaults = flags(&[("size", "large".into())]);
        let fetched = flags(&[("size", "small".into())]);
        let merged = merge(Some(&fetched), &defaults);
        assert!(matches!(merged, Cow::Borrowed(_)));
        assert_eq!(merged["size"].as_str(), Some("small"));
    }

    #[test]
    fn test_null_without_default_is_preserved() {
        let defaults = flags(&[("dog", false.into())]);
        let fetched = flags(&[("cat", FlagValue::Null)]);
        let merged = merge(Some(&fetched), &defaults);
        assert_eq!(merged["cat"], FlagValue::Null);
        assert_eq!(merged["dog"], FlagValue::Bool(false));
    }

    #[test]
    fn test_nothing_fetched_yields_defaults() {
        let defaults = flags(&[("dog", false.into())]);
        let merged = merge(None, &defaults);
        assert!(matches!(merged, Cow::Borrowed(_)));
        assert_eq!(*merged, defaults);
    }

    #[test]
    fn test_extra_fetched_keys_are_kept() {
        let defaults = flags(&[("dog", false.into())]);
        let fetched = flags(&[("cat", true.into())]);
        let merged = merge(Some(&fetched), &defaults);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["cat"], FlagValue::Bool(true));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let defaults = flags(&[("dog", false.into()), ("size", "large".into())]);
        let cases = [
            flags(&[]),
            flags(&[("dog", FlagValue::Null)]),
            flags(&[("dog", true.into()), ("extra", FlagValue::Null)]),
            flags(&[("size", "small".into()), ("dog", true.into())]),
        ];
        for fetched in &cases {
            let once = merge(Some(fetched), &defaults).into_owned();
            let twice = merge(Some(&once), &defaults);
            assert!(matches!(twice, Cow::Borrowed(_)));
            assert_eq!(*twice, once);
        }
    }
}
