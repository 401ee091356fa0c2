//! Publication - a named, schema-versioned set of typed elements
//!
//! A `Publication` is the unit of announcement on the bus: an ordered,
//! growable sequence of named elements, each pairing a metadata record with
//! a current value. Element order is append-only; positions are never reused
//! or reordered, because downstream consumers address elements by index
//! after matching names once at announce time.
//!
//! The same type backs both sides of the bus: the owning client holds the
//! authoritative copy with dirty tracking, and daemons/leaders hold mirrors
//! rebuilt from announce frames.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::meta::Metadata;
use crate::value::{Value, ValueData, ValueState, ValueType};
use crate::{ProtocolError, Result, MAX_NAME_LENGTH};

/// Identity of the process that owns a publication
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProcessId {
    /// Node (host) identifier
    pub node: String,
    /// OS process id
    pub process: u32,
    /// Rank within a parallel job, 0 for standalone processes
    pub rank: u32,
    /// Program name, if the owner chose to report one
    pub program: String,
}

/// One named element: metadata plus current value
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    value_type: ValueType,
    meta: Metadata,
    value: Value,
}

impl Element {
    /// Element name, unique within its publication
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared wire type
    #[inline]
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Metadata record, immutable after announce
    #[inline]
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Current value slot
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }
}

/// Microseconds since the Unix epoch
fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// A named, schema-versioned publication
///
/// # Versioning
///
/// `version` increments every time the element schema changes (an element
/// is added). Value writes never change the version. Receivers replace
/// their whole mirror on a re-announce rather than merging.
#[derive(Debug, Clone)]
pub struct Publication {
    guid: u64,
    title: String,
    origin: ProcessId,
    version: u32,
    elements: Vec<Element>,
    /// Name lookup built as elements are added; rebuilt wholesale when a
    /// mirror is replaced on re-announce
    name_index: HashMap<String, usize>,
    created_at: u64,
    last_publish_at: u64,
}

impl Publication {
    /// Create an empty publication owned by `origin`
    pub fn new(guid: u64, title: impl Into<String>, origin: ProcessId) -> Self {
        Self {
            guid,
            title: title.into(),
            origin,
            version: 0,
            elements: Vec::new(),
            name_index: HashMap::new(),
            created_at: now_micros(),
            last_publish_at: 0,
        }
    }

    /// Globally unique publication id
    #[inline]
    pub fn guid(&self) -> u64 {
        self.guid
    }

    /// Human-readable title
    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Owning process identity
    #[inline]
    pub fn origin(&self) -> &ProcessId {
        &self.origin
    }

    /// Current schema version
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Elements in announce order
    #[inline]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Number of elements
    #[inline]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Creation time, microseconds since epoch
    #[inline]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Last time a value frame was applied or packed, microseconds since epoch
    #[inline]
    pub fn last_publish_at(&self) -> u64 {
        self.last_publish_at
    }

    pub(crate) fn touch_publish(&mut self) {
        self.last_publish_at = now_micros();
    }

    /// Add a new element to the schema
    ///
    /// Appends at the next index and bumps the schema version. The caller
    /// must re-announce before publishing to the new element, or peers will
    /// reject frames referencing the unknown index.
    pub fn add_element(
        &mut self,
        name: impl Into<String>,
        value_type: ValueType,
        meta: Metadata,
    ) -> Result<usize> {
        let name = name.into();
        if name.len() > MAX_NAME_LENGTH {
            return Err(ProtocolError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        if self.name_index.contains_key(&name) {
            return Err(ProtocolError::DuplicateElement(name));
        }
        let index = self.elements.len();
        self.name_index.insert(name.clone(), index);
        self.elements.push(Element {
            name,
            value_type,
            meta,
            value: Value::empty(),
        });
        self.version += 1;
        Ok(index)
    }

    /// Look up an element index by name
    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// Get an element by index
    #[inline]
    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Get an element by name
    #[inline]
    pub fn element_by_name(&self, name: &str) -> Option<&Element> {
        self.index_of(name).and_then(|i| self.elements.get(i))
    }

    /// Write a value to a named element and mark it dirty
    ///
    /// Fails with `UnknownElement` if the name was never added, or
    /// `TypeMismatch` if the payload type disagrees with the declared type.
    /// No implicit numeric coercion, ever.
    pub fn write(&mut self, name: &str, data: ValueData) -> Result<usize> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ProtocolError::UnknownElement(name.to_owned()))?;
        let element = &mut self.elements[index];
        if data.value_type() != element.value_type {
            return Err(ProtocolError::TypeMismatch {
                index,
                frame_type: data.value_type(),
                schema_type: element.value_type,
            });
        }
        element.value.write(data);
        Ok(index)
    }

    /// Read the current value of a named element
    pub fn get_val(&self, name: &str) -> Result<Option<&ValueData>> {
        self.element_by_name(name)
            .map(|e| e.value().data())
            .ok_or_else(|| ProtocolError::UnknownElement(name.to_owned()))
    }

    /// Whether any element is dirty
    pub fn has_pending(&self) -> bool {
        self.elements.iter().any(|e| e.value.is_dirty())
    }

    /// Apply a received value to a mirrored element by index
    ///
    /// Validates the index against the mirrored element count and the type
    /// tag against the declared type.
    pub(crate) fn apply_at(&mut self, index: usize, data: ValueData) -> Result<()> {
        let element_count = self.elements.len();
        let element = self
            .elements
            .get_mut(index)
            .ok_or(ProtocolError::SchemaMismatch {
                guid: self.guid,
                index,
                element_count,
            })?;
        if data.value_type() != element.value_type {
            return Err(ProtocolError::TypeMismatch {
                index,
                frame_type: data.value_type(),
                schema_type: element.value_type,
            });
        }
        element.value.apply(data);
        Ok(())
    }

    /// Dirty elements as (index, element) pairs, in announce order
    pub fn dirty(&self) -> impl Iterator<Item = (usize, &Element)> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.value.is_dirty())
    }

    pub(crate) fn element_value_mut(&mut self, index: usize) -> &mut Value {
        self.elements[index].value_mut()
    }

    /// Rebuild a mirror from announced schema parts, replacing any prior
    /// elements. Used by `apply_announce`; values reset to empty.
    pub(crate) fn replace_schema(
        &mut self,
        version: u32,
        parts: Vec<(String, ValueType, Metadata)>,
    ) {
        self.version = version;
        self.elements.clear();
        self.name_index.clear();
        for (name, value_type, meta) in parts {
            self.name_index.insert(name.clone(), self.elements.len());
            self.elements.push(Element {
                name,
                value_type,
                meta,
                value: Value::empty(),
            });
        }
    }

    /// Pretty-print the publication for inspection tools
    ///
    /// One line per element: index, name, type, state, value.
    pub fn display_pub(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "pub {:#x} {:?} v{} ({} elements)",
            self.guid,
            self.title,
            self.version,
            self.elements.len()
        );
        for (i, e) in self.elements.iter().enumerate() {
            let state = match e.value.state() {
                ValueState::Clean => "clean",
                ValueState::Dirty => "dirty",
                ValueState::Empty => "empty",
            };
            match e.value.data() {
                Some(data) => {
                    let _ = writeln!(
                        out,
                        "  [{i:4}] {:<24} {:<8} {:<6} {}",
                        e.name,
                        e.value_type.as_str(),
                        state,
                        data
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "  [{i:4}] {:<24} {:<8} {:<6} -",
                        e.name,
                        e.value_type.as_str(),
                        state
                    );
                }
            }
        }
        out
    }

    /// Export (name, current value) pairs for every non-empty element
    ///
    /// The snapshot form consumed by inspection and formatting tools.
    pub fn expand_data(&self) -> Vec<(&str, &ValueData)> {
        self.elements
            .iter()
            .filter_map(|e| e.value.data().map(|d| (e.name(), d)))
            .collect()
    }
}
