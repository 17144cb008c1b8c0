//! Structural schema tree: composites, segments and loops
//!
//! Definitions are assembled with the consuming `with_*` methods and then
//! frozen behind an `Arc`; nothing in a bound schema is mutated afterwards,
//! so one tree can back any number of concurrently validated documents.

use crate::discriminator::Implementation;
use crate::simple::SimpleType;
use edi_ir::ElementPosition;
use std::fmt;
use std::sync::Arc;

/// Upper occurrence bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaxOccurs {
    Bounded(usize),
    Unbounded,
}

impl MaxOccurs {
    /// Whether `count` occurrences stay within the bound
    #[must_use]
    pub fn allows(self, count: usize) -> bool {
        match self {
            Self::Bounded(max) => count <= max,
            Self::Unbounded => true,
        }
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(max) => write!(f, "{max}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Component slot of a composite
#[derive(Debug, Clone)]
pub struct ComponentReference {
    ty: Arc<SimpleType>,
    min_occurs: usize,
}

impl ComponentReference {
    #[must_use]
    pub fn new(ty: Arc<SimpleType>) -> Self {
        Self { ty, min_occurs: 0 }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.min_occurs = 1;
        self
    }

    #[must_use]
    pub fn simple_type(&self) -> &Arc<SimpleType> {
        &self.ty
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.min_occurs > 0
    }
}

/// Ordered group of components within one element position
#[derive(Debug, Clone)]
pub struct CompositeType {
    id: String,
    components: Vec<ComponentReference>,
}

impl CompositeType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            components: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_component(mut self, component: ComponentReference) -> Self {
        self.components.push(component);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn components(&self) -> &[ComponentReference] {
        &self.components
    }

    /// Component at a 1-based index
    #[must_use]
    pub fn component(&self, index: usize) -> Option<&ComponentReference> {
        index.checked_sub(1).and_then(|i| self.components.get(i))
    }
}

/// What an element position holds
#[derive(Debug, Clone)]
pub enum ElementTarget {
    Simple(Arc<SimpleType>),
    Composite(Arc<CompositeType>),
}

/// Element slot of a segment
#[derive(Debug, Clone)]
pub struct ElementReference {
    target: ElementTarget,
    min_occurs: usize,
    max_occurs: usize,
}

impl ElementReference {
    #[must_use]
    pub fn simple(ty: Arc<SimpleType>) -> Self {
        Self::new(ElementTarget::Simple(ty))
    }

    #[must_use]
    pub fn composite(ty: Arc<CompositeType>) -> Self {
        Self::new(ElementTarget::Composite(ty))
    }

    fn new(target: ElementTarget) -> Self {
        Self {
            target,
            min_occurs: 0,
            max_occurs: 1,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.min_occurs = 1;
        self
    }

    /// Allowed repetitions of the element
    #[must_use]
    pub fn repeats(mut self, max_occurs: usize) -> Self {
        self.max_occurs = max_occurs.max(1);
        self
    }

    #[must_use]
    pub fn target(&self) -> &ElementTarget {
        &self.target
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.min_occurs > 0
    }

    #[must_use]
    pub fn max_occurs(&self) -> usize {
        self.max_occurs
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match &self.target {
            ElementTarget::Simple(ty) => ty.id(),
            ElementTarget::Composite(ty) => ty.id(),
        }
    }
}

/// Segment definition: a tag and its ordered elements
#[derive(Debug, Clone)]
pub struct SegmentType {
    id: String,
    tag: String,
    elements: Vec<ElementReference>,
    implementations: Vec<Implementation<Arc<SegmentType>>>,
}

impl SegmentType {
    /// Create a segment whose id is its tag
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self::with_id(tag.clone(), tag)
    }

    /// Create a segment with a distinct id (alternative definitions of one tag)
    pub fn with_id(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            elements: Vec::new(),
            implementations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_element(mut self, element: ElementReference) -> Self {
        self.elements.push(element);
        self
    }

    #[must_use]
    pub fn with_implementation(mut self, implementation: Implementation<Arc<SegmentType>>) -> Self {
        self.implementations.push(implementation);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn elements(&self) -> &[ElementReference] {
        &self.elements
    }

    /// Element at a 1-based index
    #[must_use]
    pub fn element(&self, index: usize) -> Option<&ElementReference> {
        index.checked_sub(1).and_then(|i| self.elements.get(i))
    }

    #[must_use]
    pub fn implementations(&self) -> &[Implementation<Arc<SegmentType>>] {
        &self.implementations
    }

    #[must_use]
    pub fn is_polymorphic(&self) -> bool {
        !self.implementations.is_empty()
    }
}

/// Loop definition: a repeatable group of segments and loops.
///
/// A nested loop starts with a segment reference; its tag opens each
/// occurrence of the loop.
#[derive(Debug, Clone)]
pub struct LoopType {
    id: String,
    children: Vec<Reference>,
    implementations: Vec<Implementation<Vec<Reference>>>,
}

impl LoopType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            implementations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: Reference) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_implementation(mut self, implementation: Implementation<Vec<Reference>>) -> Self {
        self.implementations.push(implementation);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn children(&self) -> &[Reference] {
        &self.children
    }

    #[must_use]
    pub fn implementations(&self) -> &[Implementation<Vec<Reference>>] {
        &self.implementations
    }

    #[must_use]
    pub fn is_polymorphic(&self) -> bool {
        !self.implementations.is_empty()
    }

    /// Segment opening each occurrence of the loop
    #[must_use]
    pub fn leading_segment(&self) -> Option<&Arc<SegmentType>> {
        match self.children.first().map(Reference::structure) {
            Some(Structure::Segment(segment)) => Some(segment),
            _ => None,
        }
    }

    /// Tag opening each occurrence of the loop
    #[must_use]
    pub fn leading_tag(&self) -> Option<&str> {
        self.leading_segment().map(|s| s.tag())
    }

    /// Index of the first child at or after `from` that `tag` starts
    #[must_use]
    pub fn find_child(&self, tag: &str, from: usize) -> Option<usize> {
        find_child(&self.children, tag, from)
    }
}

/// Index of the first reference at or after `from` that `tag` starts
#[must_use]
pub fn find_child(children: &[Reference], tag: &str, from: usize) -> Option<usize> {
    children
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, child)| child.leading_tag() == Some(tag))
        .map(|(index, _)| index)
}

/// Kind of structure a reference points to
#[derive(Debug, Clone)]
pub enum Structure {
    Segment(Arc<SegmentType>),
    Loop(Arc<LoopType>),
}

/// Occurrence-bounded use of a segment or loop within a loop
#[derive(Debug, Clone)]
pub struct Reference {
    structure: Structure,
    min_occurs: usize,
    max_occurs: MaxOccurs,
}

impl Reference {
    #[must_use]
    pub fn to_segment(segment: Arc<SegmentType>) -> Self {
        Self::new(Structure::Segment(segment))
    }

    #[must_use]
    pub fn to_loop(child: Arc<LoopType>) -> Self {
        Self::new(Structure::Loop(child))
    }

    fn new(structure: Structure) -> Self {
        Self {
            structure,
            min_occurs: 0,
            max_occurs: MaxOccurs::Bounded(1),
        }
    }

    /// Set both occurrence bounds
    #[must_use]
    pub fn occurs(mut self, min_occurs: usize, max_occurs: MaxOccurs) -> Self {
        self.min_occurs = min_occurs;
        self.max_occurs = max_occurs;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.min_occurs = self.min_occurs.max(1);
        self
    }

    #[must_use]
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    #[must_use]
    pub fn min_occurs(&self) -> usize {
        self.min_occurs
    }

    #[must_use]
    pub fn max_occurs(&self) -> MaxOccurs {
        self.max_occurs
    }

    #[must_use]
    pub fn is_loop(&self) -> bool {
        matches!(self.structure, Structure::Loop(_))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match &self.structure {
            Structure::Segment(segment) => segment.id(),
            Structure::Loop(child) => child.id(),
        }
    }

    /// Segment tag that starts an occurrence of this reference
    #[must_use]
    pub fn leading_tag(&self) -> Option<&str> {
        match &self.structure {
            Structure::Segment(segment) => Some(segment.tag()),
            Structure::Loop(child) => child.leading_tag(),
        }
    }
}

/// Simple type addressed by an element position within a segment
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    /// The position addresses a simple type
    Simple(&'a Arc<SimpleType>),
    /// The segment declares fewer elements
    NoSuchElement,
    /// The composite declares fewer components, or the element is simple
    NoSuchComponent,
}

impl SegmentType {
    /// Resolve the simple type at `position`.
    ///
    /// Component 1 of a simple element addresses the element itself.
    #[must_use]
    pub fn lookup(&self, position: ElementPosition) -> Lookup<'_> {
        let Some(element) = self.element(position.element) else {
            return Lookup::NoSuchElement;
        };
        match (element.target(), position.component) {
            (ElementTarget::Simple(ty), None | Some(1)) => Lookup::Simple(ty),
            (ElementTarget::Simple(_), Some(_)) => Lookup::NoSuchComponent,
            (ElementTarget::Composite(composite), component) => composite
                .component(component.unwrap_or(1))
                .map_or(Lookup::NoSuchComponent, |c| Lookup::Simple(c.simple_type())),
        }
    }
}
