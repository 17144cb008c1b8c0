//! Bound schema: a frozen structural tree checked for ambiguity
//!
//! Binding walks the tree once before any document is validated, so that
//! a definition that would make segment matching non-deterministic is
//! rejected up front instead of surfacing differently per document.

use crate::discriminator::{Discriminator, Implementation};
use crate::structure::{LoopType, Reference, SegmentType, Structure};
use crate::{Error, Result};
use edi_ir::{Location, Violation, ViolationKind};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// A complete, validated EDI schema
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    root: Arc<LoopType>,
    tags: BTreeSet<String>,
}

impl Schema {
    /// Bind a structural tree into a schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDefinition`] for malformed loops or
    /// implementations, and [`Error::Ambiguous`] listing every
    /// `AMBIGUOUS_SCHEMA_DEFINITION` defect found.
    pub fn bind(name: impl Into<String>, root: Arc<LoopType>) -> Result<Self> {
        let name = name.into();
        if root.is_polymorphic() {
            return Err(Error::InvalidDefinition(format!(
                "root loop '{}' cannot declare implementations",
                root.id()
            )));
        }

        let mut binder = Binder::default();
        binder.visit_loop(&root, root.id())?;

        if !binder.defects.is_empty() {
            return Err(Error::Ambiguous(binder.defects));
        }

        info!(
            "Bound schema {} ({} loops, {} segment tags)",
            name,
            binder.visited.len(),
            binder.tags.len()
        );

        Ok(Self {
            name,
            root,
            tags: binder.tags,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root loop (the interchange)
    #[must_use]
    pub fn root(&self) -> &Arc<LoopType> {
        &self.root
    }

    /// Whether any segment in the schema carries `tag`
    #[must_use]
    pub fn defines_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

#[derive(Default)]
struct Binder {
    visited: HashSet<*const LoopType>,
    tags: BTreeSet<String>,
    defects: Vec<Violation>,
}

impl Binder {
    fn visit_loop(&mut self, node: &Arc<LoopType>, path: &str) -> Result<()> {
        if !self.visited.insert(Arc::as_ptr(node)) {
            return Ok(());
        }
        debug!("Binding loop {}", path);

        self.visit_children(node.children(), path)?;

        if node.is_polymorphic() {
            let leading = node.leading_tag().ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "loop '{path}' has implementations but does not start with a segment"
                ))
            })?;
            if node.leading_segment().is_some_and(|s| s.is_polymorphic()) {
                return Err(Error::InvalidDefinition(format!(
                    "loop '{path}' has implementations and so cannot start with polymorphic segment '{leading}'"
                )));
            }

            for implementation in node.implementations() {
                let implementation_path = format!("{path}[{}]", implementation.id());
                let body = implementation.body();
                let starts_alike = matches!(
                    body.first().map(Reference::structure),
                    Some(Structure::Segment(segment)) if segment.tag() == leading
                );
                if !starts_alike {
                    return Err(Error::InvalidDefinition(format!(
                        "implementation '{implementation_path}' must start with segment '{leading}'"
                    )));
                }
                self.visit_children(body, &implementation_path)?;
            }

            self.check_discriminators(node.implementations(), path);
        }

        Ok(())
    }

    fn visit_children(&mut self, children: &[Reference], path: &str) -> Result<()> {
        self.check_ambiguous_tags(children, path);

        for child in children {
            match child.structure() {
                Structure::Segment(segment) => self.visit_segment(segment, path)?,
                Structure::Loop(nested) => {
                    let nested_path = format!("{path}/{}", nested.id());
                    if nested.leading_segment().is_none() {
                        return Err(Error::InvalidDefinition(format!(
                            "loop '{nested_path}' must start with a segment"
                        )));
                    }
                    self.visit_loop(nested, &nested_path)?;
                }
            }
        }
        Ok(())
    }

    fn visit_segment(&mut self, segment: &Arc<SegmentType>, path: &str) -> Result<()> {
        self.tags.insert(segment.tag().to_string());
        if !segment.is_polymorphic() {
            return Ok(());
        }

        let segment_path = format!("{path}/{}", segment.id());
        for implementation in segment.implementations() {
            let body = implementation.body();
            if body.tag() != segment.tag() {
                return Err(Error::InvalidDefinition(format!(
                    "implementation '{}' of segment '{segment_path}' has tag '{}'",
                    implementation.id(),
                    body.tag()
                )));
            }
            if body.is_polymorphic() {
                return Err(Error::InvalidDefinition(format!(
                    "implementation '{}' of segment '{segment_path}' cannot nest implementations",
                    implementation.id()
                )));
            }
        }
        self.check_discriminators(segment.implementations(), &segment_path);
        Ok(())
    }

    /// From any cursor position, the reachable children are the child
    /// itself and the following ones up to the first required child. Two
    /// reachable children starting with one tag make matching ambiguous.
    fn check_ambiguous_tags(&mut self, children: &[Reference], path: &str) {
        let mut pairs = BTreeSet::new();

        for start in 0..children.len() {
            let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
            for (index, child) in children.iter().enumerate().skip(start) {
                if let Some(tag) = child.leading_tag() {
                    if let Some(first) = seen.insert(tag, index) {
                        pairs.insert((first, index, tag.to_string()));
                    }
                }
                if index > start && child.min_occurs() > 0 {
                    break;
                }
            }
        }

        for (first, second, tag) in pairs {
            self.defects.push(Violation::new(
                ViolationKind::AmbiguousSchemaDefinition,
                Location::schema(path),
                format!(
                    "segment tag '{tag}' starts both '{}' and '{}' without a discriminator",
                    children[first].id(),
                    children[second].id()
                ),
            ));
        }
    }

    fn check_discriminators<T>(&mut self, implementations: &[Implementation<T>], path: &str) {
        let Some(first) = implementations.first().map(Implementation::discriminator) else {
            return;
        };

        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for implementation in implementations {
            let discriminator: &Discriminator = implementation.discriminator();
            if discriminator.position() != first.position() {
                self.defects.push(Violation::new(
                    ViolationKind::AmbiguousSchemaDefinition,
                    Location::schema(path),
                    format!(
                        "implementation '{}' discriminates on {} but its siblings use {}",
                        implementation.id(),
                        discriminator.position(),
                        first.position()
                    ),
                ));
            }
            for value in discriminator.values() {
                if let Some(owner) = owners.insert(value.as_str(), implementation.id()) {
                    self.defects.push(Violation::new(
                        ViolationKind::AmbiguousSchemaDefinition,
                        Location::schema(path),
                        format!(
                            "discriminator value '{value}' selects both '{owner}' and '{}'",
                            implementation.id()
                        ),
                    ));
                }
            }
        }
    }
}
