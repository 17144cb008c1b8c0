//! Structural events produced by an EDI tokenizer

use crate::location::ElementPosition;
use serde::{Deserialize, Serialize};

/// Component separator understood by [`StreamEvent::segment`]
pub const COMPONENT_SEPARATOR: char = ':';

/// Repetition separator understood by [`StreamEvent::segment`]
pub const REPETITION_SEPARATOR: char = '^';

/// A single element or component value as it appeared in the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementValue {
    /// Element/component coordinates within the segment
    pub position: ElementPosition,

    /// 0-based repetition of the element
    pub repetition: usize,

    /// Raw value, unmodified
    pub value: String,
}

impl ElementValue {
    /// Create a value for the first occurrence of a position
    pub fn new(position: ElementPosition, value: impl Into<String>) -> Self {
        Self {
            position,
            repetition: 0,
            value: value.into(),
        }
    }

    /// Set the repetition index
    #[must_use]
    pub fn repetition(mut self, repetition: usize) -> Self {
        self.repetition = repetition;
        self
    }

    /// Whether the value carries no data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Ordered structural token delivered to the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Start of an interchange, with the version declared in its header
    InterchangeStart { version: Option<String> },

    /// A segment tag was read
    SegmentStart { tag: String },

    /// A composite element begins
    CompositeStart {
        position: ElementPosition,
        repetition: usize,
    },

    /// Simple element or component data
    Element(ElementValue),

    /// A composite element ends
    CompositeEnd {
        position: ElementPosition,
        repetition: usize,
    },

    /// The current segment terminator was read
    SegmentEnd,

    /// End of the interchange
    InterchangeEnd,
}

impl StreamEvent {
    /// Shorthand for a simple element value
    pub fn element(element: usize, value: impl Into<String>) -> Self {
        Self::Element(ElementValue::new(ElementPosition::element(element), value))
    }

    /// Expand one segment into the events a tokenizer would produce.
    ///
    /// Each entry of `elements` is one element; `:` splits components and
    /// `^` splits repetitions, so `"A:B^C"` is a repeated composite.
    pub fn segment(tag: impl Into<String>, elements: &[&str]) -> Vec<Self> {
        let mut events = vec![Self::SegmentStart { tag: tag.into() }];

        for (index, raw) in elements.iter().enumerate() {
            let element = index + 1;
            for (repetition, occurrence) in raw.split(REPETITION_SEPARATOR).enumerate() {
                if occurrence.contains(COMPONENT_SEPARATOR) {
                    let position = ElementPosition::element(element);
                    events.push(Self::CompositeStart {
                        position,
                        repetition,
                    });
                    for (offset, component) in occurrence.split(COMPONENT_SEPARATOR).enumerate() {
                        events.push(Self::Element(
                            ElementValue::new(
                                ElementPosition::component(element, offset + 1),
                                component,
                            )
                            .repetition(repetition),
                        ));
                    }
                    events.push(Self::CompositeEnd {
                        position,
                        repetition,
                    });
                } else {
                    events.push(Self::Element(
                        ElementValue::new(ElementPosition::element(element), occurrence)
                            .repetition(repetition),
                    ));
                }
            }
        }

        events.push(Self::SegmentEnd);
        events
    }

    /// Short name of the event kind, for logs and error messages
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InterchangeStart { .. } => "interchange start",
            Self::SegmentStart { .. } => "segment start",
            Self::CompositeStart { .. } => "composite start",
            Self::Element(_) => "element",
            Self::CompositeEnd { .. } => "composite end",
            Self::SegmentEnd => "segment end",
            Self::InterchangeEnd => "interchange end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_segment_expansion() {
        let events = StreamEvent::segment("N1", &["ST", "ACME"]);
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            StreamEvent::SegmentStart {
                tag: "N1".to_string()
            }
        );
        assert_eq!(events[1], StreamEvent::element(1, "ST"));
        assert_eq!(events[2], StreamEvent::element(2, "ACME"));
        assert_eq!(events[3], StreamEvent::SegmentEnd);
    }

    #[test]
    fn test_composite_and_repetition_expansion() {
        let events = StreamEvent::segment("DTM", &["137:20240115^2:X"]);
        // start, (cs, 2 values, ce) x 2, end
        assert_eq!(events.len(), 10);
        match &events[3] {
            StreamEvent::Element(value) => {
                assert_eq!(value.position, ElementPosition::component(1, 2));
                assert_eq!(value.repetition, 0);
                assert_eq!(value.value, "20240115");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[7] {
            StreamEvent::Element(value) => {
                assert_eq!(value.repetition, 1);
                assert_eq!(value.value, "X");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_empty_element_is_kept() {
        let events = StreamEvent::segment("REF", &["", "X"]);
        match &events[1] {
            StreamEvent::Element(value) => assert!(value.is_empty()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = StreamEvent::element(2, "ABC");
        let json = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert_eq!(back.name(), "element");
    }
}
