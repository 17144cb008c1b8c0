//! Version ranges and version-scoped attribute resolution
//!
//! A schema attribute can be overridden for a range of document versions.
//! Overrides are kept in declaration order and resolved with [`resolve`]:
//! the first override whose range contains the document version and which
//! sets the requested field wins, otherwise the base value applies.

use crate::{Error, Result};
use std::cmp::Ordering;

/// Inclusive range of document versions; either bound may be open
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<String>,
    max: Option<String>,
}

impl VersionRange {
    /// Create a range, checking that `min <= max`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDefinition`] when the minimum sorts after the maximum.
    pub fn new(min: Option<String>, max: Option<String>) -> Result<Self> {
        if let (Some(lo), Some(hi)) = (&min, &max) {
            if compare_versions(lo, hi) == Ordering::Greater {
                return Err(Error::InvalidDefinition(format!(
                    "version range minimum '{lo}' is greater than maximum '{hi}'"
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// Range matching every version
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Inclusive lower bound
    #[must_use]
    pub fn min(&self) -> Option<&str> {
        self.min.as_deref()
    }

    /// Inclusive upper bound
    #[must_use]
    pub fn max(&self) -> Option<&str> {
        self.max.as_deref()
    }

    /// Whether `version` falls within the range
    #[must_use]
    pub fn applies_to(&self, version: &str) -> bool {
        let above_min = self
            .min
            .as_deref()
            .is_none_or(|min| compare_versions(version, min) != Ordering::Less);
        let below_max = self
            .max
            .as_deref()
            .is_none_or(|max| compare_versions(version, max) != Ordering::Greater);
        above_min && below_max
    }
}

/// Compare two version strings.
///
/// Purely numeric versions (`00401`, `00801`) compare by value, anything
/// else (`D96A`, `4.1`) compares lexically.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if is_numeric(a) && is_numeric(b) {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

fn is_numeric(version: &str) -> bool {
    !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit())
}

/// Something scoped to a version range
pub trait Versioned {
    /// Range of versions the item applies to
    fn range(&self) -> &VersionRange;
}

/// Resolve a version-scoped attribute.
///
/// The first override in declaration order that applies to `version` decides:
/// its `field` when it sets one, otherwise `base`. Later overrides are not
/// consulted. Falls back to `base` when nothing applies or when no version
/// is known.
pub fn resolve<'a, T, O, F>(base: &'a T, overrides: &'a [O], version: Option<&str>, field: F) -> &'a T
where
    T: ?Sized,
    O: Versioned,
    F: Fn(&'a O) -> Option<&'a T>,
{
    let Some(version) = version else {
        return base;
    };

    overrides
        .iter()
        .find(|candidate| candidate.range().applies_to(version))
        .and_then(field)
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Override {
        range: VersionRange,
        max_length: Option<usize>,
        label: Option<String>,
    }

    impl Versioned for Override {
        fn range(&self) -> &VersionRange {
            &self.range
        }
    }

    fn range(min: Option<&str>, max: Option<&str>) -> VersionRange {
        VersionRange::new(min.map(String::from), max.map(String::from)).unwrap()
    }

    fn max_override(min: &str, max: &str, max_length: usize) -> Override {
        Override {
            range: range(Some(min), Some(max)),
            max_length: Some(max_length),
            label: None,
        }
    }

    #[test]
    fn test_compare_numeric_versions() {
        assert_eq!(compare_versions("00401", "00401"), Ordering::Equal);
        assert_eq!(compare_versions("00401", "00501"), Ordering::Less);
        assert_eq!(compare_versions("0801", "00700"), Ordering::Greater);
        assert_eq!(compare_versions("10", "9"), Ordering::Greater);
    }

    #[test]
    fn test_compare_lexical_versions() {
        assert_eq!(compare_versions("D96A", "D01B"), Ordering::Greater);
        assert_eq!(compare_versions("D96A", "D96A"), Ordering::Equal);
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let r = range(Some("00600"), Some("00700"));
        assert!(r.applies_to("00600"));
        assert!(r.applies_to("00650"));
        assert!(r.applies_to("00700"));
        assert!(!r.applies_to("00599"));
        assert!(!r.applies_to("00800"));
    }

    #[test]
    fn test_open_bounds() {
        assert!(range(None, Some("00500")).applies_to("00100"));
        assert!(!range(None, Some("00500")).applies_to("00501"));
        assert!(range(Some("00500"), None).applies_to("99999"));
        assert!(VersionRange::unbounded().applies_to("anything"));
    }

    #[test]
    fn test_reversed_range_rejected() {
        let result = VersionRange::new(Some("00700".into()), Some("00600".into()));
        assert!(matches!(result, Err(Error::InvalidDefinition(_))));
    }

    #[test]
    fn test_resolve_matching_and_fallback() {
        let base = 5usize;
        let overrides = vec![max_override("00600", "00700", 10)];

        let at = |v: &str| *resolve(&base, &overrides, Some(v), |o| o.max_length.as_ref());
        assert_eq!(at("00650"), 10);
        assert_eq!(at("00800"), 5);
    }

    #[test]
    fn test_resolve_without_version_uses_base() {
        let base = 5usize;
        let overrides = vec![Override {
            range: VersionRange::unbounded(),
            max_length: Some(99),
            label: None,
        }];
        assert_eq!(*resolve(&base, &overrides, None, |o| o.max_length.as_ref()), 5);
    }

    #[test]
    fn test_resolve_unmatched_versions_agree() {
        let base = 5usize;
        let overrides = vec![max_override("00600", "00700", 10)];
        let first = *resolve(&base, &overrides, Some("00100"), |o| o.max_length.as_ref());
        let second = *resolve(&base, &overrides, Some("00900"), |o| o.max_length.as_ref());
        assert_eq!(first, base);
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let base = 5usize;
        let a = max_override("00100", "00900", 7);
        let b = max_override("00500", "00600", 9);

        let forward = vec![a, b];
        assert_eq!(*resolve(&base, &forward, Some("00550"), |o| o.max_length.as_ref()), 7);

        let backward: Vec<_> = forward.into_iter().rev().collect();
        assert_eq!(*resolve(&base, &backward, Some("00550"), |o| o.max_length.as_ref()), 9);
    }

    #[test]
    fn test_resolve_unset_field_inherits_base() {
        let base_len = 5usize;
        let base_label = String::from("base");
        let overrides = vec![
            Override {
                range: VersionRange::unbounded(),
                max_length: None,
                label: Some("first".into()),
            },
            Override {
                range: VersionRange::unbounded(),
                max_length: Some(12),
                label: Some("second".into()),
            },
        ];

        let len = resolve(&base_len, &overrides, Some("1"), |o| o.max_length.as_ref());
        let label = resolve(base_label.as_str(), &overrides, Some("1"), |o| {
            o.label.as_deref()
        });
        // The first applicable override decides every field
        assert_eq!(*len, 5);
        assert_eq!(label, "first");

        // Out of range for the first, so the second applies
        let narrow = vec![
            max_override("00100", "00200", 7),
            Override {
                range: VersionRange::unbounded(),
                max_length: Some(12),
                label: None,
            },
        ];
        assert_eq!(*resolve(&base_len, &narrow, Some("00300"), |o| o.max_length.as_ref()), 12);
    }

    #[test]
    fn test_resolve_is_repeatable() {
        let base = 5usize;
        let overrides = vec![max_override("00600", "00700", 10)];
        let first = resolve(&base, &overrides, Some("00650"), |o| o.max_length.as_ref());
        let second = resolve(&base, &overrides, Some("00650"), |o| o.max_length.as_ref());
        assert!(std::ptr::eq(first, second));
    }
}
