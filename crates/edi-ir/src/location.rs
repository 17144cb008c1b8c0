//! Coordinates of data within a segment and within the stream
#![allow(clippy::must_use_candidate)] // Constructor helpers are clear at call sites without #[must_use].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position of an element (and optionally a component) inside a segment.
///
/// Both indexes are 1-based, the way EDI implementation guides number them
/// (`N101`, `N102`, `C040-01`). A `None` component addresses a simple
/// element; for ordering purposes it is the same slot as component 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementPosition {
    /// Element index within the segment (1-based)
    pub element: usize,

    /// Component index within a composite (1-based)
    pub component: Option<usize>,
}

impl ElementPosition {
    /// Position of a simple element
    pub fn element(element: usize) -> Self {
        Self {
            element,
            component: None,
        }
    }

    /// Position of a component within a composite element
    pub fn component(element: usize, component: usize) -> Self {
        Self {
            element,
            component: Some(component),
        }
    }

    /// Build a position from untrusted input, rejecting 0 indexes
    ///
    /// # Errors
    ///
    /// Returns an error when the element or component index is 0.
    pub fn checked(element: usize, component: Option<usize>) -> crate::Result<Self> {
        if element == 0 {
            return Err(crate::Error::invalid_position(
                element,
                "element positions are 1-based",
            ));
        }
        if component == Some(0) {
            return Err(crate::Error::invalid_position(
                element,
                "component positions are 1-based",
            ));
        }
        Ok(Self { element, component })
    }

    /// Component index with simple elements folded onto component 1
    pub fn component_or_first(&self) -> usize {
        self.component.unwrap_or(1)
    }

    /// Compare two positions in stream order
    pub fn stream_cmp(&self, other: &Self) -> Ordering {
        self.element
            .cmp(&other.element)
            .then(self.component_or_first().cmp(&other.component_or_first()))
    }

    /// Whether both positions address the same data slot
    pub fn same_slot(&self, other: &Self) -> bool {
        self.stream_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for ElementPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component {
            Some(component) => write!(f, "{:02}-{:02}", self.element, component),
            None => write!(f, "{:02}", self.element),
        }
    }
}

/// Location of a violation within the document stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based count of segments seen in the stream
    pub segment_index: usize,

    /// Tag of the segment being processed
    pub segment_tag: Option<String>,

    /// Element/component coordinates, when the violation concerns data
    pub position: Option<ElementPosition>,

    /// 0-based repetition of the element
    pub repetition: Option<usize>,

    /// Schema path of the structure (e.g. `INTERCHANGE/L0100/N1`)
    pub schema_path: String,
}

impl Location {
    /// Location of a segment
    pub fn segment(
        segment_index: usize,
        segment_tag: impl Into<String>,
        schema_path: impl Into<String>,
    ) -> Self {
        Self {
            segment_index,
            segment_tag: Some(segment_tag.into()),
            position: None,
            repetition: None,
            schema_path: schema_path.into(),
        }
    }

    /// Location without any stream coordinates (schema-bind time)
    pub fn schema(schema_path: impl Into<String>) -> Self {
        Self {
            schema_path: schema_path.into(),
            ..Self::default()
        }
    }

    /// Narrow the location to an element/component slot
    #[must_use]
    pub fn at(mut self, position: ElementPosition, repetition: usize) -> Self {
        self.position = Some(position);
        self.repetition = Some(repetition);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.segment_tag {
            Some(tag) => write!(f, "segment {} ({tag})", self.segment_index)?,
            None => write!(f, "schema")?,
        }
        if let Some(position) = &self.position {
            write!(f, " element {position}")?;
        }
        if !self.schema_path.is_empty() {
            write!(f, " at {}", self.schema_path)?;
        }
        Ok(())
    }
}
