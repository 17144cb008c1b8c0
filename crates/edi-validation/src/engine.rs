//! Streaming validation engine
//!
//! The [`Validator`] consumes tokenizer events in arrival order and walks
//! the bound schema in lock-step. It keeps a stack of open loop
//! occurrences, each with per-child occurrence counts and the
//! implementation selected by its discriminator.
//!
//! Values of a segment whose implementation is still undetermined are
//! buffered and checked once the discriminator resolves, against the
//! selected implementation (or the base definition when nothing matches).

use crate::config::ValidationConfig;
use crate::rules;
use crate::{Error, Result};
use edi_ir::{
    ElementPosition, ElementValue, Location, Severity, StreamEvent, Violation, ViolationKind,
};
use edi_schema::structure::find_child;
use edi_schema::{
    ElementTarget, Implementation, Lookup, LoopType, Reference, Schema, SegmentType, Selection,
    Structure, select,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Lifecycle of one document's validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidatorState {
    /// No interchange started yet
    AwaitingInterchange,
    /// Only the root frame is open
    InInterchange,
    /// One or more nested loop frames are open
    InStructure,
    /// The interchange ended
    Complete,
    /// A fatal violation halted validation
    Failed,
}

impl fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingInterchange => "awaiting interchange",
            Self::InInterchange => "in interchange",
            Self::InStructure => "in structure",
            Self::Complete => "complete",
            Self::Failed => "failed",
        })
    }
}

/// Implementation in effect for a loop occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    /// The discriminator has not been read yet
    Pending,
    Base,
    Implementation(usize),
}

/// One open loop occurrence
#[derive(Debug)]
struct Frame {
    node: Arc<LoopType>,
    path: String,
    active: Active,
    counts: Vec<usize>,
    cursor: usize,
}

impl Frame {
    fn root(node: Arc<LoopType>) -> Self {
        let counts = vec![0; node.children().len()];
        Self {
            path: node.id().to_string(),
            node,
            active: Active::Base,
            counts,
            cursor: 0,
        }
    }

    /// Open an occurrence whose leading segment has just been read
    fn open(node: Arc<LoopType>, path: String) -> Self {
        let active = if node.is_polymorphic() {
            Active::Pending
        } else {
            Active::Base
        };
        let mut counts = vec![0; node.children().len()];
        if let Some(leading) = counts.first_mut() {
            *leading = 1;
        }
        Self {
            node,
            path,
            active,
            counts,
            cursor: 0,
        }
    }

    fn children(&self) -> &[Reference] {
        match self.active {
            Active::Implementation(index) => self
                .node
                .implementations()
                .get(index)
                .map_or(self.node.children(), |i| i.body().as_slice()),
            Active::Pending | Active::Base => self.node.children(),
        }
    }

    /// Report every child in `range` that occurred fewer times than required
    fn missing(&self, range: Range<usize>, here: &Location, raw: &mut Vec<Violation>) {
        for (index, child) in self
            .children()
            .iter()
            .enumerate()
            .take(range.end)
            .skip(range.start)
        {
            let count = self.counts.get(index).copied().unwrap_or(0);
            if count >= child.min_occurs() {
                continue;
            }
            let kind = if child.is_loop() {
                ViolationKind::RequiredLoopMissing
            } else {
                ViolationKind::RequiredSegmentMissing
            };
            let mut location = here.clone();
            location.schema_path = format!("{}/{}", self.path, child.id());
            raw.push(Violation::new(
                kind,
                location,
                format!(
                    "{} occurs {count} time(s), at least {} required",
                    child.id(),
                    child.min_occurs()
                ),
            ));
        }
    }

    /// Whether every child from the cursor on has met its minimum
    fn satisfied(&self) -> bool {
        self.children()
            .iter()
            .enumerate()
            .skip(self.cursor)
            .all(|(index, child)| {
                self.counts.get(index).copied().unwrap_or(0) >= child.min_occurs()
            })
    }

    /// `tag` starts a child already passed while a required child is still
    /// outstanding
    fn out_of_sequence(&self, tag: &str) -> bool {
        let children = self.children();
        let passed = &children[..self.cursor.min(children.len())];
        find_child(passed, tag, 0).is_some() && !self.satisfied()
    }

    /// Check the children left after the cursor before the frame is popped
    fn close(&self, here: &Location, raw: &mut Vec<Violation>) {
        debug!("Leaving loop {}", self.path);
        self.missing(self.cursor..self.children().len(), here, raw);
    }

    /// Select the occurrence's implementation from its leading segment.
    ///
    /// Returns `false` while the discriminator value has not arrived.
    fn resolve(
        &mut self,
        segment: &mut SegmentState,
        complete: bool,
        raw: &mut Vec<Violation>,
    ) -> bool {
        let node = Arc::clone(&self.node);
        match select(node.implementations(), &segment.values, complete) {
            Selection::Unresolved => false,
            Selection::Resolved(index) => {
                if let Some(implementation) = node.implementations().get(index) {
                    debug!(
                        "Loop {} resolved to implementation {}",
                        self.path,
                        implementation.id()
                    );
                    self.active = Active::Implementation(index);
                    self.counts = vec![0; implementation.body().len()];
                    if let Some(leading) = self.counts.first_mut() {
                        *leading = 1;
                    }
                    self.cursor = 0;
                    self.path = format!("{}[{}]", self.path, implementation.id());

                    if let Some(Structure::Segment(leading)) =
                        implementation.body().first().map(Reference::structure)
                    {
                        segment.path = format!("{}/{}", self.path, leading.id());
                        segment.ty = Some(Arc::clone(leading));
                    }
                }
                true
            }
            Selection::NoMatch => {
                self.active = Active::Base;
                raw.push(segment.unresolved(node.implementations(), &self.path));
                true
            }
        }
    }
}

/// Discriminator awaiting its value within the current segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// The enclosing loop occurrence
    Loop,
    /// The segment itself
    Segment,
}

/// The segment currently being read
#[derive(Debug)]
struct SegmentState {
    index: usize,
    tag: String,
    path: String,
    /// `None` when the segment is skipped
    ty: Option<Arc<SegmentType>>,
    pending: Option<Pending>,
    values: Vec<ElementValue>,
    checked: usize,
    flagged: HashSet<(usize, usize)>,
}

impl SegmentState {
    fn new(
        index: usize,
        tag: &str,
        path: String,
        ty: Option<Arc<SegmentType>>,
        pending: Option<Pending>,
    ) -> Self {
        Self {
            index,
            tag: tag.to_string(),
            path,
            ty,
            pending,
            values: Vec::new(),
            checked: 0,
            flagged: HashSet::new(),
        }
    }

    fn skipped(index: usize, tag: &str, path: String) -> Self {
        Self::new(index, tag, path, None, None)
    }

    fn location(&self) -> Location {
        Location::segment(self.index, &self.tag, &self.path)
    }

    /// Select among the segment's own implementations
    fn resolve(&mut self, complete: bool, raw: &mut Vec<Violation>) -> bool {
        let Some(ty) = self.ty.clone() else {
            return true;
        };
        match select(ty.implementations(), &self.values, complete) {
            Selection::Unresolved => false,
            Selection::Resolved(index) => {
                if let Some(implementation) = ty.implementations().get(index) {
                    debug!(
                        "Segment {} resolved to implementation {}",
                        self.path,
                        implementation.id()
                    );
                    self.path = format!("{}[{}]", self.path, implementation.id());
                    self.ty = Some(Arc::clone(implementation.body()));
                }
                true
            }
            Selection::NoMatch => {
                raw.push(self.unresolved(ty.implementations(), &self.path));
                true
            }
        }
    }

    fn unresolved<T>(&self, implementations: &[Implementation<T>], owner: &str) -> Violation {
        let discriminator = implementations.first().map(Implementation::discriminator);
        let value = discriminator
            .and_then(|d| d.value_in(&self.values, true))
            .unwrap_or_default()
            .to_string();

        let mut location = self.location();
        if let Some(discriminator) = discriminator {
            location = location.at(discriminator.position(), 0);
        }
        Violation::new(
            ViolationKind::UnresolvedImplementation,
            location,
            format!("no implementation of {owner} matches '{value}'"),
        )
        .with_value(value)
    }

    /// Check every value received since the last call
    fn check_values(&mut self, version: Option<&str>, check_codes: bool, raw: &mut Vec<Violation>) {
        if let Some(ty) = &self.ty {
            let location = self.location();
            for value in &self.values[self.checked..] {
                check_value(
                    ty,
                    value,
                    version,
                    check_codes,
                    &location,
                    &mut self.flagged,
                    raw,
                );
            }
        }
        self.checked = self.values.len();
    }

    /// Required elements, and required components of present composites,
    /// that carry no data
    fn missing_elements(&self, raw: &mut Vec<Violation>) {
        let Some(ty) = &self.ty else {
            return;
        };

        for (offset, reference) in ty.elements().iter().enumerate() {
            let element = offset + 1;
            let present: BTreeSet<usize> = self
                .values
                .iter()
                .filter(|v| v.position.element == element && !v.is_empty())
                .map(|v| v.repetition)
                .filter(|repetition| *repetition < reference.max_occurs())
                .collect();

            if present.is_empty() {
                if reference.is_required() {
                    raw.push(Violation::new(
                        ViolationKind::RequiredElementMissing,
                        self.location().at(ElementPosition::element(element), 0),
                        format!("required element {} ({}) missing", element, reference.id()),
                    ));
                }
                continue;
            }

            let ElementTarget::Composite(composite) = reference.target() else {
                continue;
            };
            for repetition in present {
                for (index, component) in composite.components().iter().enumerate() {
                    let position = ElementPosition::component(element, index + 1);
                    let has_value = self.values.iter().any(|v| {
                        v.repetition == repetition && v.position.same_slot(&position) && !v.is_empty()
                    });
                    if component.is_required() && !has_value {
                        raw.push(Violation::new(
                            ViolationKind::RequiredElementMissing,
                            self.location().at(position, repetition),
                            format!(
                                "required component {position} ({}) missing",
                                component.simple_type().id()
                            ),
                        ));
                    }
                }
            }
        }
    }
}

/// Check one value against the segment definition
fn check_value(
    segment: &SegmentType,
    value: &ElementValue,
    version: Option<&str>,
    check_codes: bool,
    location: &Location,
    flagged: &mut HashSet<(usize, usize)>,
    raw: &mut Vec<Violation>,
) {
    if value.is_empty() {
        return;
    }
    let position = value.position;
    let at = location.clone().at(position, value.repetition);

    let Some(reference) = segment.element(position.element) else {
        if flagged.insert((position.element, value.repetition)) {
            raw.push(
                Violation::new(
                    ViolationKind::TooManyDataElements,
                    at,
                    format!(
                        "{} declares {} element(s)",
                        segment.tag(),
                        segment.elements().len()
                    ),
                )
                .with_value(&value.value),
            );
        }
        return;
    };

    if value.repetition >= reference.max_occurs() {
        if flagged.insert((position.element, value.repetition)) {
            raw.push(
                Violation::new(
                    ViolationKind::TooManyRepetitions,
                    at,
                    format!(
                        "{} repeats at most {} time(s)",
                        reference.id(),
                        reference.max_occurs()
                    ),
                )
                .with_value(&value.value),
            );
        }
        return;
    }

    match segment.lookup(position) {
        Lookup::Simple(ty) => {
            for failure in rules::check_value(ty, version, &value.value, check_codes) {
                raw.push(
                    Violation::new(failure.kind, at.clone(), failure.message)
                        .with_value(&value.value),
                );
            }
        }
        Lookup::NoSuchComponent => raw.push(
            Violation::new(
                ViolationKind::TooManyComponents,
                at,
                format!("{} has no component {position}", reference.id()),
            )
            .with_value(&value.value),
        ),
        // Handled by the element lookup above
        Lookup::NoSuchElement => {}
    }
}

/// Streaming validator for one document at a time.
///
/// The schema is shared read-only; all mutable state belongs to the
/// validator, so each concurrently validated document needs its own.
#[derive(Debug)]
pub struct Validator {
    schema: Arc<Schema>,
    config: ValidationConfig,
    state: ValidatorState,
    version: Option<String>,
    stack: Vec<Frame>,
    segment: Option<SegmentState>,
    segment_count: usize,
    last_tag: Option<String>,
    error_count: usize,
}

impl Validator {
    /// Create a validator with the default configuration
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, ValidationConfig::default())
    }

    /// Create with specific configuration
    #[must_use]
    pub fn with_config(schema: Arc<Schema>, config: ValidationConfig) -> Self {
        Self {
            schema,
            config,
            state: ValidatorState::AwaitingInterchange,
            version: None,
            stack: Vec::new(),
            segment: None,
            segment_count: 0,
            last_tag: None,
            error_count: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ValidatorState {
        self.state
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Version declared by the current interchange
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Number of open loop frames, the root included
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Process one event, returning the violations it caused
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedEvent`] when the event cannot occur in the
    /// current state and [`Error::Halted`] once validation is over.
    pub fn handle(&mut self, event: &StreamEvent) -> Result<Vec<Violation>> {
        trace!("Handling {}", event.name());
        match event {
            StreamEvent::InterchangeStart { version } => self.start_interchange(version.as_deref()),
            StreamEvent::SegmentStart { tag } => self.segment_start(tag),
            StreamEvent::CompositeStart {
                position,
                repetition,
            } => self.composite_start(*position, *repetition),
            StreamEvent::Element(value) => self.element(value),
            StreamEvent::CompositeEnd {
                position,
                repetition,
            } => self.composite_end(*position, *repetition),
            StreamEvent::SegmentEnd => self.segment_end(),
            StreamEvent::InterchangeEnd => self.end_interchange(),
        }
    }

    /// Open the root frame; `version` selects version-scoped constraints
    ///
    /// # Errors
    ///
    /// Returns an error unless the validator awaits an interchange.
    pub fn start_interchange(&mut self, version: Option<&str>) -> Result<Vec<Violation>> {
        match self.state {
            ValidatorState::AwaitingInterchange => {}
            ValidatorState::Complete | ValidatorState::Failed => {
                return Err(Error::Halted(self.state));
            }
            state => {
                return Err(Error::UnexpectedEvent {
                    event: "interchange start",
                    state,
                });
            }
        }

        self.version = version.map(str::to_string);
        debug!(
            "Interchange started against schema {} (version {:?})",
            self.schema.name(),
            self.version
        );
        self.stack.push(Frame::root(Arc::clone(self.schema.root())));
        self.state = ValidatorState::InInterchange;
        Ok(Vec::new())
    }

    /// Match a segment tag against the open frames
    ///
    /// # Errors
    ///
    /// Returns an error outside an interchange or inside another segment.
    pub fn segment_start(&mut self, tag: &str) -> Result<Vec<Violation>> {
        self.ensure_open("segment start")?;
        if self.segment.is_some() {
            return Err(Error::UnexpectedEvent {
                event: "segment start",
                state: self.state,
            });
        }

        self.segment_count += 1;
        self.last_tag = Some(tag.to_string());
        trace!("Segment {} ({})", self.segment_count, tag);

        let mut raw = Vec::new();
        let segment = if let Some((depth, index)) = self.locate(tag) {
            self.enter(depth, index, tag, &mut raw)
        } else {
            let current = self.stack.last();
            let path = current.map(|f| f.path.clone()).unwrap_or_default();
            let location = Location::segment(self.segment_count, tag, &path);
            let violation = if current.is_some_and(|frame| frame.out_of_sequence(tag)) {
                Violation::new(
                    ViolationKind::UnexpectedSegment,
                    location,
                    format!("segment {tag} is out of sequence in {path}"),
                )
            } else {
                Violation::new(
                    ViolationKind::SegmentNotInSchema,
                    location,
                    format!(
                        "segment {tag} cannot occur in any open loop of schema {}",
                        self.schema.name()
                    ),
                )
            };
            raw.push(violation.with_value(tag));
            SegmentState::skipped(self.segment_count, tag, path)
        };

        self.segment = Some(segment);
        self.sync_state();
        Ok(self.classify(raw))
    }

    /// # Errors
    ///
    /// Returns an error outside a segment.
    pub fn composite_start(
        &mut self,
        position: ElementPosition,
        repetition: usize,
    ) -> Result<Vec<Violation>> {
        self.ensure_segment("composite start")?;
        trace!("Composite {} repetition {} starts", position, repetition);
        Ok(Vec::new())
    }

    /// # Errors
    ///
    /// Returns an error outside a segment.
    pub fn composite_end(
        &mut self,
        position: ElementPosition,
        repetition: usize,
    ) -> Result<Vec<Violation>> {
        self.ensure_segment("composite end")?;
        trace!("Composite {} repetition {} ends", position, repetition);
        Ok(Vec::new())
    }

    /// Check an element or component value
    ///
    /// # Errors
    ///
    /// Returns an error outside a segment.
    pub fn element(&mut self, value: &ElementValue) -> Result<Vec<Violation>> {
        self.ensure_segment("element")?;
        trace!("Element {} = '{}'", value.position, value.value);

        if let Some(segment) = self.segment.as_mut() {
            segment.values.push(value.clone());
        }
        let raw = self.advance(false);
        Ok(self.classify(raw))
    }

    /// Finish the current segment
    ///
    /// # Errors
    ///
    /// Returns an error outside a segment.
    pub fn segment_end(&mut self) -> Result<Vec<Violation>> {
        self.ensure_segment("segment end")?;

        let mut raw = self.advance(true);
        if let Some(segment) = self.segment.take() {
            segment.missing_elements(&mut raw);
            trace!("Segment {} ({}) ends", segment.index, segment.tag);
        }
        Ok(self.classify(raw))
    }

    /// Close every open frame and complete the document
    ///
    /// # Errors
    ///
    /// Returns an error outside an interchange or inside a segment.
    pub fn end_interchange(&mut self) -> Result<Vec<Violation>> {
        self.ensure_open("interchange end")?;
        if self.segment.is_some() {
            return Err(Error::UnexpectedEvent {
                event: "interchange end",
                state: self.state,
            });
        }

        let here = self.here();
        let mut raw = Vec::new();
        while let Some(frame) = self.stack.pop() {
            frame.close(&here, &mut raw);
        }
        self.state = ValidatorState::Complete;

        let violations = self.classify(raw);
        debug!(
            "Interchange ended after {} segments ({})",
            self.segment_count, self.state
        );
        Ok(violations)
    }

    /// Abort the current document, discarding open frames without checking
    /// their minimum occurrences
    pub fn reset(&mut self) {
        debug!(
            "Validator reset at segment {} ({})",
            self.segment_count, self.state
        );
        self.stack.clear();
        self.segment = None;
        self.version = None;
        self.segment_count = 0;
        self.last_tag = None;
        self.error_count = 0;
        self.state = ValidatorState::AwaitingInterchange;
    }

    fn ensure_open(&self, event: &'static str) -> Result<()> {
        match self.state {
            ValidatorState::InInterchange | ValidatorState::InStructure => Ok(()),
            ValidatorState::Complete | ValidatorState::Failed => Err(Error::Halted(self.state)),
            ValidatorState::AwaitingInterchange => Err(Error::UnexpectedEvent {
                event,
                state: self.state,
            }),
        }
    }

    fn ensure_segment(&self, event: &'static str) -> Result<()> {
        self.ensure_open(event)?;
        if self.segment.is_none() {
            return Err(Error::UnexpectedEvent {
                event,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Stream position of the most recent segment
    fn here(&self) -> Location {
        Location {
            segment_index: self.segment_count,
            segment_tag: self.last_tag.clone(),
            ..Location::default()
        }
    }

    /// Innermost frame with a child `tag` can start, and that child's index.
    ///
    /// Nested frames never match their leading segment again: a repeated
    /// leading tag starts a new occurrence in the parent.
    fn locate(&self, tag: &str) -> Option<(usize, usize)> {
        self.stack.iter().enumerate().rev().find_map(|(depth, frame)| {
            let from = if depth == 0 {
                frame.cursor
            } else {
                frame.cursor.max(1)
            };
            find_child(frame.children(), tag, from).map(|index| (depth, index))
        })
    }

    /// Move to child `index` of the frame at `depth`, closing deeper frames
    fn enter(
        &mut self,
        depth: usize,
        index: usize,
        tag: &str,
        raw: &mut Vec<Violation>,
    ) -> SegmentState {
        let here = self.here();
        while self.stack.len() > depth + 1 {
            if let Some(frame) = self.stack.pop() {
                frame.close(&here, raw);
            }
        }

        let segment_index = self.segment_count;
        let frame = &mut self.stack[depth];
        frame.missing(frame.cursor..index, &here, raw);
        frame.cursor = index;

        let count = frame.counts.get_mut(index).map_or(1, |count| {
            *count += 1;
            *count
        });
        let child = frame.children()[index].clone();
        let parent_path = frame.path.clone();

        if !child.max_occurs().allows(count) {
            let kind = if child.is_loop() {
                ViolationKind::LoopOccursTooManyTimes
            } else {
                ViolationKind::SegmentExceedsMaximumUse
            };
            raw.push(Violation::new(
                kind,
                Location::segment(segment_index, tag, format!("{parent_path}/{}", child.id())),
                format!(
                    "{} occurrence {count} exceeds maximum {}",
                    child.id(),
                    child.max_occurs()
                ),
            ));
        }

        match child.structure() {
            Structure::Segment(segment) => SegmentState::new(
                segment_index,
                tag,
                format!("{parent_path}/{}", segment.id()),
                Some(Arc::clone(segment)),
                segment.is_polymorphic().then_some(Pending::Segment),
            ),
            Structure::Loop(node) => {
                let path = format!("{parent_path}/{}", node.id());
                debug!("Entering loop {} (occurrence {})", path, count);

                let leading = node.leading_segment().cloned();
                let segment_path = format!(
                    "{path}/{}",
                    leading.as_ref().map_or(tag, |segment| segment.id())
                );
                let pending = node.is_polymorphic().then_some(Pending::Loop);
                self.stack.push(Frame::open(Arc::clone(node), path));
                SegmentState::new(segment_index, tag, segment_path, leading, pending)
            }
        }
    }

    /// Resolve a pending discriminator when possible, then check the values
    /// not checked yet
    fn advance(&mut self, complete: bool) -> Vec<Violation> {
        let mut raw = Vec::new();
        let version = self.version.as_deref();
        let check_codes = self.config.validate_code_values;
        let Some(segment) = self.segment.as_mut() else {
            return raw;
        };

        if let Some(pending) = segment.pending {
            let resolved = match pending {
                Pending::Loop => self
                    .stack
                    .last_mut()
                    .is_none_or(|frame| frame.resolve(segment, complete, &mut raw)),
                Pending::Segment => segment.resolve(complete, &mut raw),
            };
            if !resolved {
                return raw;
            }
            segment.pending = None;
        }

        segment.check_values(version, check_codes, &mut raw);
        raw
    }

    fn sync_state(&mut self) {
        if matches!(
            self.state,
            ValidatorState::InInterchange | ValidatorState::InStructure
        ) {
            self.state = if self.stack.len() > 1 {
                ValidatorState::InStructure
            } else {
                ValidatorState::InInterchange
            };
        }
    }

    /// Apply configured severities; a fatal violation halts validation
    fn classify(&mut self, raw: Vec<Violation>) -> Vec<Violation> {
        let mut violations = Vec::with_capacity(raw.len());

        for violation in raw {
            let severity = self.config.severity_of(violation.kind);
            let violation = violation.with_severity(severity);
            if severity >= Severity::Error {
                self.error_count += 1;
            }
            debug!("{:?}: {}", severity, violation);

            if violation.is_fatal() && self.state != ValidatorState::Failed {
                warn!("Validation halted: {}", violation);
                self.state = ValidatorState::Failed;
            }
            violations.push(violation);
        }

        if self.config.max_errors > 0
            && self.error_count >= self.config.max_errors
            && self.state != ValidatorState::Failed
        {
            warn!(
                "Validation halted after {} errors",
                self.error_count
            );
            self.state = ValidatorState::Failed;
        }

        if self.state == ValidatorState::Failed {
            self.stack.clear();
            self.segment = None;
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrictnessLevel;
    use edi_schema::{
        BaseKind, ComponentReference, CompositeType, Discriminator, ElementReference, MaxOccurs,
        SimpleType,
    };

    fn ty(id: &str, kind: BaseKind, min: usize, max: usize) -> Arc<SimpleType> {
        Arc::new(SimpleType::builder(id, kind).length(min, max).build().unwrap())
    }

    fn simple(id: &str, kind: BaseKind, min: usize, max: usize) -> ElementReference {
        ElementReference::simple(ty(id, kind, min, max))
    }

    fn schema() -> Arc<Schema> {
        let c01 = CompositeType::new("C01")
            .with_component(ComponentReference::new(ty("C0101", BaseKind::Identifier, 1, 3)).required())
            .with_component(ComponentReference::new(ty("C0102", BaseKind::String, 1, 10)));
        let hdr = SegmentType::new("HDR")
            .with_element(simple("H01", BaseKind::Identifier, 2, 3).required())
            .with_element(simple("H02", BaseKind::Date, 8, 8))
            .with_element(ElementReference::composite(Arc::new(c01)).repeats(2));

        let per_ic = SegmentType::with_id("PER_IC", "PER")
            .with_element(simple("P01S", BaseKind::String, 1, 3))
            .with_element(simple("P02", BaseKind::Identifier, 2, 2).required());
        let per = SegmentType::new("PER")
            .with_element(simple("P01", BaseKind::String, 1, 10))
            .with_element(simple("P02", BaseKind::Identifier, 2, 2).required())
            .with_implementation(Implementation::new(
                "PER_IC",
                Discriminator::new(ElementPosition::element(2), ["IC"]),
                Arc::new(per_ic),
            ));

        let lin = SegmentType::new("LIN").with_element(simple("L01", BaseKind::Integer, 1, 6).required());
        let qty = SegmentType::new("QTY").with_element(simple("Q01", BaseKind::Decimal, 1, 10).required());
        let trl = SegmentType::new("TRL").with_element(simple("T01", BaseKind::Integer, 1, 6).required());

        let lst = LoopType::new("LST")
            .with_child(Reference::to_segment(Arc::new(lin)).required())
            .with_child(Reference::to_segment(Arc::new(qty)).occurs(0, MaxOccurs::Bounded(2)));
        let root = LoopType::new("ROOT")
            .with_child(Reference::to_segment(Arc::new(hdr)).required())
            .with_child(Reference::to_segment(Arc::new(per)))
            .with_child(Reference::to_loop(Arc::new(lst)).occurs(0, MaxOccurs::Unbounded))
            .with_child(Reference::to_segment(Arc::new(trl)).required());

        Arc::new(Schema::bind("TEST", Arc::new(root)).unwrap())
    }

    fn document(segments: Vec<Vec<StreamEvent>>) -> Vec<StreamEvent> {
        let mut events = vec![StreamEvent::InterchangeStart { version: None }];
        events.extend(segments.into_iter().flatten());
        events.push(StreamEvent::InterchangeEnd);
        events
    }

    fn run(validator: &mut Validator, events: &[StreamEvent]) -> Vec<Violation> {
        let mut violations = Vec::new();
        for event in events {
            violations.extend(validator.handle(event).unwrap());
        }
        violations
    }

    fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    fn hdr() -> Vec<StreamEvent> {
        StreamEvent::segment("HDR", &["AB", "20240115"])
    }

    fn trl() -> Vec<StreamEvent> {
        StreamEvent::segment("TRL", &["3"])
    }

    #[test]
    fn test_valid_document() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            hdr(),
            StreamEvent::segment("LIN", &["1"]),
            StreamEvent::segment("QTY", &["12.5"]),
            StreamEvent::segment("LIN", &["2"]),
            trl(),
        ]);
        assert!(run(&mut validator, &events).is_empty());
        assert_eq!(validator.state(), ValidatorState::Complete);
        assert_eq!(validator.depth(), 0);
    }

    #[test]
    fn test_state_transitions() {
        let mut validator = Validator::new(schema());
        assert_eq!(validator.state(), ValidatorState::AwaitingInterchange);

        validator.start_interchange(Some("00401")).unwrap();
        assert_eq!(validator.state(), ValidatorState::InInterchange);
        assert_eq!(validator.version(), Some("00401"));

        run(&mut validator, &hdr());
        assert_eq!(validator.state(), ValidatorState::InInterchange);

        run(&mut validator, &StreamEvent::segment("LIN", &["1"]));
        assert_eq!(validator.state(), ValidatorState::InStructure);
        assert_eq!(validator.depth(), 2);

        run(&mut validator, &trl());
        assert_eq!(validator.state(), ValidatorState::InInterchange);

        assert!(validator.end_interchange().unwrap().is_empty());
        assert_eq!(validator.state(), ValidatorState::Complete);
        assert!(matches!(
            validator.segment_start("HDR"),
            Err(Error::Halted(ValidatorState::Complete))
        ));
    }

    #[test]
    fn test_segment_exceeds_maximum_use() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            hdr(),
            StreamEvent::segment("LIN", &["1"]),
            StreamEvent::segment("QTY", &["1"]),
            StreamEvent::segment("QTY", &["2"]),
            StreamEvent::segment("QTY", &["3"]),
            trl(),
        ]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::SegmentExceedsMaximumUse]);
        assert_eq!(violations[0].location.segment_index, 5);
        assert_eq!(violations[0].location.schema_path, "ROOT/LST/QTY");
    }

    #[test]
    fn test_required_segment_missing() {
        let mut validator = Validator::new(schema());
        let events = document(vec![StreamEvent::segment("LIN", &["1"]), trl()]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::RequiredSegmentMissing]);
        assert_eq!(violations[0].location.schema_path, "ROOT/HDR");
        assert_eq!(validator.state(), ValidatorState::Complete);
    }

    #[test]
    fn test_missing_at_interchange_end() {
        let mut validator = Validator::new(schema());
        let violations = run(&mut validator, &document(vec![hdr()]));
        assert_eq!(kinds(&violations), vec![ViolationKind::RequiredSegmentMissing]);
        assert_eq!(violations[0].location.schema_path, "ROOT/TRL");
    }

    #[test]
    fn test_unexpected_segment_is_skipped() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            hdr(),
            StreamEvent::segment("PER", &["JO", "IC"]),
            StreamEvent::segment("HDR", &["AB", "99999999"]),
            trl(),
        ]);
        let violations = run(&mut validator, &events);
        // The skipped segment's values are not checked
        assert_eq!(kinds(&violations), vec![ViolationKind::UnexpectedSegment]);
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(violations[0].value.as_deref(), Some("HDR"));
        assert_eq!(violations[0].location.schema_path, "ROOT");
        assert_eq!(validator.state(), ValidatorState::Complete);
    }

    #[test]
    fn test_passed_segment_in_nested_loop_is_fatal() {
        let mut validator = Validator::new(schema());
        validator.start_interchange(None).unwrap();
        run(&mut validator, &hdr());
        run(&mut validator, &StreamEvent::segment("LIN", &["1"]));

        // LST does not declare HDR and ROOT is past it
        let violations = validator.segment_start("HDR").unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::SegmentNotInSchema]);
        assert_eq!(violations[0].severity, Severity::Fatal);
        assert_eq!(violations[0].location.schema_path, "ROOT/LST");
        assert_eq!(validator.state(), ValidatorState::Failed);
    }

    #[test]
    fn test_passed_segment_in_satisfied_frame_is_fatal() {
        let mut validator = Validator::new(schema());
        validator.start_interchange(None).unwrap();
        run(&mut validator, &hdr());
        run(&mut validator, &trl());

        let violations = validator.segment_start("HDR").unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::SegmentNotInSchema]);
        assert_eq!(validator.state(), ValidatorState::Failed);
    }

    #[test]
    fn test_segment_not_in_schema_is_fatal() {
        let mut validator = Validator::new(schema());
        validator.start_interchange(None).unwrap();
        run(&mut validator, &hdr());

        let violations = validator.segment_start("ZZZ").unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::SegmentNotInSchema]);
        assert!(violations[0].is_fatal());
        assert_eq!(validator.state(), ValidatorState::Failed);
        assert_eq!(validator.depth(), 0);
        assert!(matches!(
            validator.handle(&StreamEvent::element(1, "X")),
            Err(Error::Halted(ValidatorState::Failed))
        ));
    }

    #[test]
    fn test_lenient_skips_unknown_segment() {
        let config = ValidationConfig::with_strictness(StrictnessLevel::Lenient);
        let mut validator = Validator::with_config(schema(), config);
        let events = document(vec![hdr(), StreamEvent::segment("ZZZ", &["1"]), trl()]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::SegmentNotInSchema]);
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(validator.state(), ValidatorState::Complete);
    }

    #[test]
    fn test_strict_missing_segment_fails() {
        let config = ValidationConfig::with_strictness(StrictnessLevel::Strict);
        let mut validator = Validator::with_config(schema(), config);
        validator.start_interchange(None).unwrap();
        let violations = validator.segment_start("TRL").unwrap();
        assert_eq!(kinds(&violations), vec![ViolationKind::RequiredSegmentMissing]);
        assert_eq!(validator.state(), ValidatorState::Failed);
        assert!(matches!(
            validator.segment_end(),
            Err(Error::Halted(ValidatorState::Failed))
        ));
    }

    #[test]
    fn test_element_checks() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            StreamEvent::segment("HDR", &["ABCD", "20241301"]),
            trl(),
        ]);
        let violations = run(&mut validator, &events);
        assert_eq!(
            kinds(&violations),
            vec![ViolationKind::TooLong, ViolationKind::InvalidDateOrTimeOrNumber]
        );
        assert_eq!(violations[0].location.position, Some(ElementPosition::element(1)));
        assert_eq!(violations[1].value.as_deref(), Some("20241301"));
    }

    #[test]
    fn test_required_element_missing() {
        let mut validator = Validator::new(schema());
        let events = document(vec![StreamEvent::segment("HDR", &["", "20240115"]), trl()]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::RequiredElementMissing]);
        assert_eq!(violations[0].location.position, Some(ElementPosition::element(1)));
    }

    #[test]
    fn test_required_component_missing() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            StreamEvent::segment("HDR", &["AB", "", ":NAME"]),
            trl(),
        ]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::RequiredElementMissing]);
        assert_eq!(
            violations[0].location.position,
            Some(ElementPosition::component(3, 1))
        );
    }

    #[test]
    fn test_data_beyond_declared_shape() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            StreamEvent::segment("HDR", &["AB", "", "X:Y:Z", "EXTRA"]),
            StreamEvent::segment("LIN", &["1"]),
            StreamEvent::segment("QTY", &["1^2^3"]),
            trl(),
        ]);
        let violations = run(&mut validator, &events);
        assert_eq!(
            kinds(&violations),
            vec![
                ViolationKind::TooManyComponents,
                ViolationKind::TooManyDataElements,
                ViolationKind::TooManyRepetitions,
                ViolationKind::TooManyRepetitions,
            ]
        );
    }

    #[test]
    fn test_repeated_composite_within_bounds() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            StreamEvent::segment("HDR", &["AB", "", "X:Y^Z"]),
            trl(),
        ]);
        assert!(run(&mut validator, &events).is_empty());
    }

    #[test]
    fn test_segment_implementation_revalidates_buffered_values() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            hdr(),
            StreamEvent::segment("PER", &["ABCDEFG", "IC"]),
            trl(),
        ]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::TooLong]);
        assert_eq!(violations[0].location.schema_path, "ROOT/PER[PER_IC]");
        assert_eq!(violations[0].location.position, Some(ElementPosition::element(1)));
    }

    #[test]
    fn test_unmatched_segment_implementation_uses_base() {
        let mut validator = Validator::new(schema());
        let events = document(vec![
            hdr(),
            StreamEvent::segment("PER", &["ABCDEFG", "XX"]),
            trl(),
        ]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::UnresolvedImplementation]);
        assert_eq!(violations[0].value.as_deref(), Some("XX"));
        assert_eq!(violations[0].location.position, Some(ElementPosition::element(2)));
    }

    #[test]
    fn test_discriminator_never_arrives() {
        let mut validator = Validator::new(schema());
        let events = document(vec![hdr(), StreamEvent::segment("PER", &["ABC"]), trl()]);
        let violations = run(&mut validator, &events);
        assert_eq!(
            kinds(&violations),
            vec![
                ViolationKind::UnresolvedImplementation,
                ViolationKind::RequiredElementMissing,
            ]
        );
        assert_eq!(violations[0].value.as_deref(), Some(""));
    }

    #[test]
    fn test_ignorable_reported_as_warning() {
        let config = ValidationConfig::default().ignore(ViolationKind::TooLong);
        let mut validator = Validator::with_config(schema(), config);
        let events = document(vec![StreamEvent::segment("HDR", &["ABCD"]), trl()]);
        let violations = run(&mut validator, &events);
        assert_eq!(kinds(&violations), vec![ViolationKind::TooLong]);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn test_max_errors_halts() {
        let config = ValidationConfig {
            max_errors: 2,
            ..Default::default()
        };
        let mut validator = Validator::with_config(schema(), config);
        validator.start_interchange(None).unwrap();
        validator.segment_start("HDR").unwrap();

        let first = validator.handle(&StreamEvent::element(1, "ABCD")).unwrap();
        assert_eq!(kinds(&first), vec![ViolationKind::TooLong]);
        assert_eq!(validator.state(), ValidatorState::InInterchange);

        // Too short and not a date: the limit is reached
        let second = validator.handle(&StreamEvent::element(2, "2024")).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(validator.state(), ValidatorState::Failed);
        assert!(matches!(
            validator.segment_end(),
            Err(Error::Halted(ValidatorState::Failed))
        ));
    }

    #[test]
    fn test_events_outside_structure() {
        let mut validator = Validator::new(schema());
        assert!(matches!(
            validator.segment_start("HDR"),
            Err(Error::UnexpectedEvent {
                state: ValidatorState::AwaitingInterchange,
                ..
            })
        ));

        validator.start_interchange(None).unwrap();
        assert!(matches!(
            validator.handle(&StreamEvent::element(1, "AB")),
            Err(Error::UnexpectedEvent { event: "element", .. })
        ));
        assert!(matches!(
            validator.start_interchange(None),
            Err(Error::UnexpectedEvent { .. })
        ));

        validator.segment_start("HDR").unwrap();
        assert!(matches!(
            validator.end_interchange(),
            Err(Error::UnexpectedEvent { .. })
        ));
    }

    #[test]
    fn test_reset_discards_state() {
        let mut validator = Validator::new(schema());
        validator.start_interchange(Some("00401")).unwrap();
        run(&mut validator, &StreamEvent::segment("LIN", &["1"]));
        validator.segment_start("QTY").unwrap();
        assert_eq!(validator.depth(), 2);

        validator.reset();
        assert_eq!(validator.state(), ValidatorState::AwaitingInterchange);
        assert_eq!(validator.depth(), 0);
        assert_eq!(validator.version(), None);

        let events = document(vec![hdr(), trl()]);
        assert!(run(&mut validator, &events).is_empty());
        assert_eq!(validator.state(), ValidatorState::Complete);
    }
}
