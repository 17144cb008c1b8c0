//! Element-level leaf types with version-scoped overrides

use crate::version::{VersionRange, Versioned, resolve};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allowed code values, mapping each code to its display label.
/// An empty map leaves the element unrestricted.
pub type CodeValues = BTreeMap<String, String>;

/// Lexical base of a simple type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseKind {
    Identifier,
    String,
    Decimal,
    Integer,
    Date,
    Time,
    Binary,
}

impl BaseKind {
    /// Numeric kinds measure length in digits
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Decimal | Self::Integer)
    }
}

/// Exception to a simple type's constraints for a range of versions.
///
/// A field left unset inherits the base type's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionOverride {
    range: VersionRange,
    min_length: Option<usize>,
    max_length: Option<usize>,
    values: Option<CodeValues>,
}

impl VersionOverride {
    /// Create an override with no fields set
    #[must_use]
    pub fn new(range: VersionRange) -> Self {
        Self {
            range,
            min_length: None,
            max_length: None,
            values: None,
        }
    }

    /// Override the minimum length
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    /// Override the maximum length
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Override the code values
    #[must_use]
    pub fn values(mut self, values: CodeValues) -> Self {
        self.values = Some(values);
        self
    }
}

impl Versioned for VersionOverride {
    fn range(&self) -> &VersionRange {
        &self.range
    }
}

/// Definition of a simple element or component.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleType {
    id: String,
    kind: BaseKind,
    scale: Option<u32>,
    min_length: usize,
    max_length: usize,
    values: CodeValues,
    versions: Vec<VersionOverride>,
    title: Option<String>,
}

impl SimpleType {
    /// Start building a simple type
    pub fn builder(id: impl Into<String>, kind: BaseKind) -> SimpleTypeBuilder {
        SimpleTypeBuilder {
            ty: SimpleType {
                id: id.into(),
                kind,
                scale: None,
                min_length: 1,
                max_length: usize::MAX,
                values: CodeValues::new(),
                versions: Vec::new(),
                title: None,
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> BaseKind {
        self.kind
    }

    /// Fixed scale of a decimal type
    #[must_use]
    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Whether any version override is declared
    #[must_use]
    pub fn has_versions(&self) -> bool {
        !self.versions.is_empty()
    }

    #[must_use]
    pub fn versions(&self) -> &[VersionOverride] {
        &self.versions
    }

    /// Minimum length effective for `version`
    #[must_use]
    pub fn min_length(&self, version: Option<&str>) -> usize {
        *resolve(&self.min_length, &self.versions, version, |o| {
            o.min_length.as_ref()
        })
    }

    /// Maximum length effective for `version`
    #[must_use]
    pub fn max_length(&self, version: Option<&str>) -> usize {
        *resolve(&self.max_length, &self.versions, version, |o| {
            o.max_length.as_ref()
        })
    }

    /// Code values effective for `version`
    #[must_use]
    pub fn values(&self, version: Option<&str>) -> &CodeValues {
        resolve(&self.values, &self.versions, version, |o| o.values.as_ref())
    }
}

/// Builder for [`SimpleType`]
#[derive(Debug)]
pub struct SimpleTypeBuilder {
    ty: SimpleType,
}

impl SimpleTypeBuilder {
    /// Set both length bounds
    #[must_use]
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.ty.min_length = min;
        self.ty.max_length = max;
        self
    }

    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.ty.min_length = len;
        self
    }

    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.ty.max_length = len;
        self
    }

    #[must_use]
    pub fn scale(mut self, scale: u32) -> Self {
        self.ty.scale = Some(scale);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.ty.title = Some(title.into());
        self
    }

    /// Add an allowed code with its label
    #[must_use]
    pub fn code(mut self, code: impl Into<String>, label: impl Into<String>) -> Self {
        self.ty.values.insert(code.into(), label.into());
        self
    }

    /// Replace the allowed code values
    #[must_use]
    pub fn values(mut self, values: CodeValues) -> Self {
        self.ty.values = values;
        self
    }

    /// Append a version override; declaration order is resolution order
    #[must_use]
    pub fn version(mut self, version: VersionOverride) -> Self {
        self.ty.versions.push(version);
        self
    }

    /// Finish the type, checking its length bounds
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDefinition`] when a minimum length exceeds the
    /// matching maximum, for the base type or for any override.
    pub fn build(self) -> Result<SimpleType> {
        let ty = self.ty;
        if ty.min_length > ty.max_length {
            return Err(Error::InvalidDefinition(format!(
                "element type '{}': minLength {} exceeds maxLength {}",
                ty.id, ty.min_length, ty.max_length
            )));
        }
        for version in &ty.versions {
            let min = version.min_length.unwrap_or(ty.min_length);
            let max = version.max_length.unwrap_or(ty.max_length);
            if min > max {
                return Err(Error::InvalidDefinition(format!(
                    "element type '{}': minLength {min} exceeds maxLength {max} for versions {:?}..={:?}",
                    ty.id,
                    version.range.min(),
                    version.range.max()
                )));
            }
        }
        Ok(ty)
    }
}
