//! Value-based selection among alternative implementations
//!
//! Loops and segments that look identical on the wire (same leading tag)
//! can carry several implementations. Each implementation names a
//! discriminator: an element position inside the leading segment and the
//! values that select it.

use edi_ir::{ElementPosition, ElementValue};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Element position plus trigger values selecting one implementation.
///
/// Two discriminators are equal when both the position and the value set
/// match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Discriminator {
    position: ElementPosition,
    values: BTreeSet<String>,
}

impl Discriminator {
    pub fn new<I, S>(position: ElementPosition, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            position,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn position(&self) -> ElementPosition {
        self.position
    }

    #[must_use]
    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    /// Whether `value` triggers this discriminator
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.values.contains(value)
    }

    /// Value at the discriminator position, or `None` while it may still arrive.
    ///
    /// Once the stream has moved past the position (or the segment is
    /// `complete`) an absent value reads as empty.
    #[must_use]
    pub fn value_in<'a>(&self, elements: &'a [ElementValue], complete: bool) -> Option<&'a str> {
        if let Some(found) = elements
            .iter()
            .find(|e| e.repetition == 0 && e.position.same_slot(&self.position))
        {
            return Some(found.value.as_str());
        }

        let passed = elements
            .last()
            .is_some_and(|last| last.position.stream_cmp(&self.position) == Ordering::Greater);

        (complete || passed).then_some("")
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {:?}", self.position, self.values)
    }
}

/// One alternative implementation of a loop or segment
#[derive(Debug, Clone)]
pub struct Implementation<T> {
    id: String,
    discriminator: Discriminator,
    body: T,
}

impl<T> Implementation<T> {
    pub fn new(id: impl Into<String>, discriminator: Discriminator, body: T) -> Self {
        Self {
            id: id.into(),
            discriminator,
            body,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    /// The implementation's content (child list or segment definition)
    #[must_use]
    pub fn body(&self) -> &T {
        &self.body
    }
}

/// Outcome of a discriminator lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index of the selected implementation
    Resolved(usize),
    /// The discriminator value was read but selects nothing
    NoMatch,
    /// The discriminator element has not been read yet
    Unresolved,
}

/// Select the implementation triggered by the current segment's elements.
///
/// `elements` holds the values read so far, in stream order; `complete`
/// tells whether the segment has ended.
#[must_use]
pub fn select<T>(
    implementations: &[Implementation<T>],
    elements: &[ElementValue],
    complete: bool,
) -> Selection {
    let mut waiting = false;

    for (index, candidate) in implementations.iter().enumerate() {
        match candidate.discriminator.value_in(elements, complete) {
            Some(value) if candidate.discriminator.matches(value) => {
                return Selection::Resolved(index);
            }
            Some(_) => {}
            None => waiting = true,
        }
    }

    if waiting {
        Selection::Unresolved
    } else {
        Selection::NoMatch
    }
}
