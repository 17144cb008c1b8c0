//! Schema loader for JSON/YAML schema descriptions
//!
//! A schema file lists element, composite, segment and loop definitions
//! by id and names the root loop. References between definitions are
//! resolved into one `Arc`-shared tree, which is then bound.

use crate::discriminator::{Discriminator, Implementation};
use crate::model::Schema;
use crate::registry::ConcurrentSchemaRegistry;
use crate::simple::{BaseKind, CodeValues, SimpleType, VersionOverride};
use crate::structure::{
    ComponentReference, CompositeType, ElementReference, LoopType, MaxOccurs, Reference,
    SegmentType,
};
use crate::version::VersionRange;
use crate::{Error, Result};
use edi_ir::ElementPosition;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Serializable schema format for loading from files
#[derive(Debug, Deserialize)]
struct SchemaFile {
    name: String,
    root: String,
    #[serde(default)]
    elements: Vec<ElementFile>,
    #[serde(default)]
    composites: Vec<CompositeFile>,
    #[serde(default)]
    segments: Vec<SegmentFile>,
    #[serde(default)]
    loops: Vec<LoopFile>,
}

#[derive(Debug, Deserialize)]
struct ElementFile {
    id: String,
    base: BaseKind,
    #[serde(default)]
    scale: Option<u32>,
    #[serde(default = "default_min_length")]
    min_length: usize,
    #[serde(default = "default_max_length")]
    max_length: usize,
    #[serde(default)]
    values: CodeValues,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    versions: Vec<VersionFile>,
}

fn default_min_length() -> usize {
    1
}

fn default_max_length() -> usize {
    35
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    #[serde(default)]
    min_version: Option<String>,
    #[serde(default)]
    max_version: Option<String>,
    #[serde(default)]
    min_length: Option<usize>,
    #[serde(default)]
    max_length: Option<usize>,
    #[serde(default)]
    values: Option<CodeValues>,
}

#[derive(Debug, Deserialize)]
struct CompositeFile {
    id: String,
    components: Vec<ComponentFile>,
}

#[derive(Debug, Deserialize)]
struct ComponentFile {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    min_occurs: usize,
}

#[derive(Debug, Deserialize)]
struct SegmentFile {
    id: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    elements: Vec<ElementRefFile>,
    #[serde(default)]
    implementations: Vec<SegmentImplementationFile>,
}

#[derive(Debug, Deserialize)]
struct ElementRefFile {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    min_occurs: usize,
    #[serde(default = "default_repeats")]
    max_occurs: usize,
}

fn default_repeats() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct SegmentImplementationFile {
    id: String,
    discriminator: DiscriminatorFile,
    segment: String,
}

#[derive(Debug, Deserialize)]
struct LoopFile {
    id: String,
    children: Vec<ChildFile>,
    #[serde(default)]
    implementations: Vec<LoopImplementationFile>,
}

#[derive(Debug, Deserialize)]
struct LoopImplementationFile {
    id: String,
    discriminator: DiscriminatorFile,
    children: Vec<ChildFile>,
}

#[derive(Debug, Deserialize)]
struct ChildFile {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    min_occurs: usize,
    #[serde(default)]
    max_occurs: Option<MaxOccursFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaxOccursFile {
    Count(usize),
    Keyword(String),
}

#[derive(Debug, Deserialize)]
struct DiscriminatorFile {
    element: usize,
    #[serde(default)]
    component: Option<usize>,
    values: Vec<String>,
}

/// Loads and caches schemas
pub struct SchemaLoader {
    registry: Arc<ConcurrentSchemaRegistry>,
    schema_paths: Vec<PathBuf>,
}

impl SchemaLoader {
    /// Create a new schema loader with the given search paths
    #[must_use]
    pub fn new(schema_paths: Vec<PathBuf>) -> Self {
        Self {
            registry: Arc::new(ConcurrentSchemaRegistry::new()),
            schema_paths,
        }
    }

    /// Create a new schema loader with a pre-configured registry
    #[must_use]
    pub fn with_registry(
        registry: Arc<ConcurrentSchemaRegistry>,
        schema_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            registry,
            schema_paths,
        }
    }

    /// Load a schema by name, checking the cache before the search paths
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no file matches, or any error raised
    /// while reading, parsing or binding the file.
    pub fn load(&self, name: &str) -> Result<Arc<Schema>> {
        if let Some(cached) = self.registry.get(name) {
            debug!("Cache hit for schema: {}", name);
            return Ok(cached);
        }

        trace!("Cache miss for schema: {}", name);
        let schema = Arc::new(self.load_from_disk(name)?);
        self.registry.register(name, Arc::clone(&schema));
        Ok(schema)
    }

    /// Load a schema from a specific file path
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, parsed or bound.
    pub fn load_from_file(&self, path: &Path) -> Result<Schema> {
        trace!("Loading schema from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;

        if path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            self.load_from_yaml(&content)
        } else {
            self.load_from_json(&content)
        }
    }

    /// Load a schema from JSON string
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] for malformed JSON and any error
    /// raised while resolving or binding the definitions.
    pub fn load_from_json(&self, json: &str) -> Result<Schema> {
        let schema_file: SchemaFile = serde_json::from_str(json)
            .map_err(|e| Error::InvalidFormat(format!("JSON parse error: {e}")))?;

        convert_schema_file(&schema_file)
    }

    /// Load a schema from YAML string
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] for malformed YAML and any error
    /// raised while resolving or binding the definitions.
    pub fn load_from_yaml(&self, yaml: &str) -> Result<Schema> {
        let schema_file: SchemaFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidFormat(format!("YAML parse error: {e}")))?;

        convert_schema_file(&schema_file)
    }

    fn load_from_disk(&self, name: &str) -> Result<Schema> {
        let stem = name.to_lowercase();
        let variations = [
            format!("{stem}.json"),
            format!("{stem}.yaml"),
            format!("{stem}.yml"),
        ];

        for path in &self.schema_paths {
            for variation in &variations {
                let file_path = path.join(variation);
                if file_path.exists() {
                    trace!("Found schema file: {:?}", file_path);
                    return self.load_from_file(&file_path);
                }
            }
        }

        Err(Error::NotFound(format!(
            "Schema {name} not found in search paths: {:?}",
            self.schema_paths
        )))
    }

    /// Add a search path for schema files
    pub fn add_path(&mut self, path: PathBuf) {
        self.schema_paths.push(path);
    }

    /// Get the registry (for testing/debugging)
    #[must_use]
    pub fn registry(&self) -> &ConcurrentSchemaRegistry {
        &self.registry
    }
}

impl Default for SchemaLoader {
    fn default() -> Self {
        Self::new(vec![PathBuf::from(".")])
    }
}

fn convert_schema_file(file: &SchemaFile) -> Result<Schema> {
    let mut resolver = Resolver::new(file)?;
    let root = resolver.loop_type(&file.root)?;
    let schema = Schema::bind(file.name.clone(), root)?;
    info!("Loaded schema {}", file.name);
    Ok(schema)
}

/// Resolves id references into shared definitions, building each once
struct Resolver<'f> {
    elements: HashMap<&'f str, &'f ElementFile>,
    composites: HashMap<&'f str, &'f CompositeFile>,
    segments: HashMap<&'f str, &'f SegmentFile>,
    loops: HashMap<&'f str, &'f LoopFile>,
    built_elements: HashMap<&'f str, Arc<SimpleType>>,
    built_composites: HashMap<&'f str, Arc<CompositeType>>,
    built_segments: HashMap<&'f str, Arc<SegmentType>>,
    built_loops: HashMap<&'f str, Arc<LoopType>>,
    in_progress: HashSet<&'f str>,
}

fn index<'f, T>(items: &'f [T], id: impl Fn(&'f T) -> &'f str) -> Result<HashMap<&'f str, &'f T>> {
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        if map.insert(id(item), item).is_some() {
            return Err(Error::InvalidDefinition(format!(
                "duplicate definition id '{}'",
                id(item)
            )));
        }
    }
    Ok(map)
}

impl<'f> Resolver<'f> {
    fn new(file: &'f SchemaFile) -> Result<Self> {
        let resolver = Self {
            elements: index(&file.elements, |e| e.id.as_str())?,
            composites: index(&file.composites, |c| c.id.as_str())?,
            segments: index(&file.segments, |s| s.id.as_str())?,
            loops: index(&file.loops, |l| l.id.as_str())?,
            built_elements: HashMap::new(),
            built_composites: HashMap::new(),
            built_segments: HashMap::new(),
            built_loops: HashMap::new(),
            in_progress: HashSet::new(),
        };

        for id in resolver.segments.keys() {
            if resolver.loops.contains_key(id) {
                return Err(Error::InvalidDefinition(format!(
                    "id '{id}' names both a segment and a loop"
                )));
            }
        }
        for id in resolver.elements.keys() {
            if resolver.composites.contains_key(id) {
                return Err(Error::InvalidDefinition(format!(
                    "id '{id}' names both an element and a composite"
                )));
            }
        }
        Ok(resolver)
    }

    fn enter(&mut self, id: &'f str) -> Result<()> {
        if self.in_progress.insert(id) {
            Ok(())
        } else {
            Err(Error::InvalidDefinition(format!(
                "circular reference involving '{id}'"
            )))
        }
    }

    fn simple_type(&mut self, id: &'f str) -> Result<Arc<SimpleType>> {
        if let Some(built) = self.built_elements.get(id) {
            return Ok(Arc::clone(built));
        }
        let file = self
            .elements
            .get(id)
            .copied()
            .ok_or_else(|| unknown("element", id))?;

        let mut builder = SimpleType::builder(&file.id, file.base)
            .length(file.min_length, file.max_length)
            .values(file.values.clone());
        if let Some(scale) = file.scale {
            builder = builder.scale(scale);
        }
        if let Some(title) = &file.title {
            builder = builder.title(title);
        }
        for version in &file.versions {
            builder = builder.version(version_override(version)?);
        }

        let built = Arc::new(builder.build()?);
        self.built_elements.insert(id, Arc::clone(&built));
        Ok(built)
    }

    fn composite_type(&mut self, id: &'f str) -> Result<Arc<CompositeType>> {
        if let Some(built) = self.built_composites.get(id) {
            return Ok(Arc::clone(built));
        }
        let file = self
            .composites
            .get(id)
            .copied()
            .ok_or_else(|| unknown("composite", id))?;

        let mut composite = CompositeType::new(&file.id);
        for component in &file.components {
            let mut reference = ComponentReference::new(self.simple_type(&component.reference)?);
            if component.min_occurs > 0 {
                reference = reference.required();
            }
            composite = composite.with_component(reference);
        }

        let built = Arc::new(composite);
        self.built_composites.insert(id, Arc::clone(&built));
        Ok(built)
    }

    fn segment_type(&mut self, id: &'f str) -> Result<Arc<SegmentType>> {
        if let Some(built) = self.built_segments.get(id) {
            return Ok(Arc::clone(built));
        }
        let file = self
            .segments
            .get(id)
            .copied()
            .ok_or_else(|| unknown("segment", id))?;
        self.enter(id)?;

        let tag = file.tag.as_deref().unwrap_or(&file.id);
        let mut segment = SegmentType::with_id(&file.id, tag);
        for element in &file.elements {
            let target = element.reference.as_str();
            let mut reference = if self.composites.contains_key(target) {
                ElementReference::composite(self.composite_type(target)?)
            } else {
                ElementReference::simple(self.simple_type(target)?)
            };
            if element.min_occurs > 0 {
                reference = reference.required();
            }
            segment = segment.with_element(reference.repeats(element.max_occurs));
        }
        for implementation in &file.implementations {
            let body = self.segment_type(&implementation.segment)?;
            segment = segment.with_implementation(Implementation::new(
                &implementation.id,
                discriminator(&implementation.discriminator)?,
                body,
            ));
        }

        self.in_progress.remove(id);
        let built = Arc::new(segment);
        self.built_segments.insert(id, Arc::clone(&built));
        Ok(built)
    }

    fn loop_type(&mut self, id: &'f str) -> Result<Arc<LoopType>> {
        if let Some(built) = self.built_loops.get(id) {
            return Ok(Arc::clone(built));
        }
        let file = self
            .loops
            .get(id)
            .copied()
            .ok_or_else(|| unknown("loop", id))?;
        self.enter(id)?;

        let mut node = LoopType::new(&file.id);
        for child in &file.children {
            node = node.with_child(self.reference(child)?);
        }
        for implementation in &file.implementations {
            let mut children = Vec::with_capacity(implementation.children.len());
            for child in &implementation.children {
                children.push(self.reference(child)?);
            }
            node = node.with_implementation(Implementation::new(
                &implementation.id,
                discriminator(&implementation.discriminator)?,
                children,
            ));
        }

        self.in_progress.remove(id);
        let built = Arc::new(node);
        self.built_loops.insert(id, Arc::clone(&built));
        Ok(built)
    }

    fn reference(&mut self, child: &'f ChildFile) -> Result<Reference> {
        let target = child.reference.as_str();
        let reference = if self.loops.contains_key(target) {
            Reference::to_loop(self.loop_type(target)?)
        } else {
            Reference::to_segment(self.segment_type(target)?)
        };
        let max = max_occurs(child.max_occurs.as_ref())?;
        if !max.allows(child.min_occurs) {
            return Err(Error::InvalidDefinition(format!(
                "{target}: min_occurs {} exceeds max_occurs {max}",
                child.min_occurs
            )));
        }
        Ok(reference.occurs(child.min_occurs, max))
    }
}

fn unknown(kind: &str, id: &str) -> Error {
    Error::InvalidDefinition(format!("unknown {kind} reference '{id}'"))
}

fn max_occurs(value: Option<&MaxOccursFile>) -> Result<MaxOccurs> {
    match value {
        None => Ok(MaxOccurs::Bounded(1)),
        Some(MaxOccursFile::Count(count)) => Ok(MaxOccurs::Bounded(*count)),
        Some(MaxOccursFile::Keyword(word)) if word.eq_ignore_ascii_case("unbounded") => {
            Ok(MaxOccurs::Unbounded)
        }
        Some(MaxOccursFile::Keyword(word)) => Err(Error::InvalidFormat(format!(
            "max_occurs must be a number or 'unbounded', found '{word}'"
        ))),
    }
}

fn version_override(file: &VersionFile) -> Result<VersionOverride> {
    let range = VersionRange::new(file.min_version.clone(), file.max_version.clone())?;
    let mut version = VersionOverride::new(range);
    if let Some(min) = file.min_length {
        version = version.min_length(min);
    }
    if let Some(max) = file.max_length {
        version = version.max_length(max);
    }
    if let Some(values) = &file.values {
        version = version.values(values.clone());
    }
    Ok(version)
}

fn discriminator(file: &DiscriminatorFile) -> Result<Discriminator> {
    let position = ElementPosition::checked(file.element, file.component)
        .map_err(|e| Error::InvalidDefinition(e.to_string()))?;
    Ok(Discriminator::new(position, file.values.iter().cloned()))
}
