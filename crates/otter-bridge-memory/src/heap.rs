//! Arena heap backing the reference engine
//!
//! Values live in a grow-only arena and are referenced by index. Index 0 is
//! `undefined`; raw references are `index + 1` so that a null pointer stays
//! free to mean "no value". Nothing is ever collected: garbage collection
//! policy belongs to a real engine.

use indexmap::{IndexMap, IndexSet};
use otter_bridge_sys::*;
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::ptr;

pub(crate) const UNDEFINED: usize = 0;
pub(crate) const NULL: usize = 1;
pub(crate) const TRUE: usize = 2;
pub(crate) const FALSE: usize = 3;
pub(crate) const OBJECT_PROTOTYPE: usize = 4;

/// Prototype chains longer than this are treated as cyclic
const MAX_CHAIN_DEPTH: usize = 1024;

pub(crate) fn to_ref(index: usize) -> BridgeValueRef {
    ptr::without_provenance_mut::<c_void>(index + 1)
}

pub(crate) fn from_ref(raw: BridgeValueRef) -> Option<usize> {
    raw.addr().checked_sub(1)
}

pub(crate) fn callback_to_addr(callback: BridgeCallbackRef) -> usize {
    callback.expose_provenance()
}

pub(crate) fn addr_to_callback(addr: usize) -> BridgeCallbackRef {
    ptr::with_exposed_provenance::<c_void>(addr)
}

#[derive(Debug)]
pub(crate) enum HeapValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(ObjectData),
}

#[derive(Debug)]
pub(crate) enum ObjectClass {
    Plain,
    Array { length: u32 },
    /// Address of the host callback slot captured at creation
    Function { callback: usize },
    RegExp { source: String, flags: BridgeRegExpFlags },
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Property {
    Data {
        value: usize,
        attributes: BridgePropertyAttributes,
    },
    Accessor {
        /// Callback slot addresses; 0 when absent
        getter: usize,
        setter: usize,
        access_control: BridgeAccessControl,
        attributes: BridgePropertyAttributes,
    },
}

impl Property {
    pub(crate) fn attributes(&self) -> BridgePropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    fn has(&self, attribute: BridgePropertyAttributes) -> bool {
        self.attributes() & attribute != 0
    }
}

#[derive(Debug)]
pub(crate) struct ObjectData {
    pub(crate) class: ObjectClass,
    pub(crate) prototype: Option<usize>,
    pub(crate) properties: IndexMap<String, Property>,
    pub(crate) elements: BTreeMap<u32, usize>,
}

impl ObjectData {
    pub(crate) fn new(class: ObjectClass, prototype: Option<usize>) -> Self {
        Self {
            class,
            prototype,
            properties: IndexMap::new(),
            elements: BTreeMap::new(),
        }
    }
}

/// Outcome of a named property read
pub(crate) enum GetLookup {
    Value(usize),
    Getter { getter: usize, holder: usize },
}

/// Outcome of resolving where a named property write lands
pub(crate) enum SetLookup {
    Setter { setter: usize, holder: usize },
    /// Accessor without a setter, or a read-only data property
    Rejected,
    Define,
}

pub(crate) struct Heap {
    values: Vec<HeapValue>,
}

impl Heap {
    pub(crate) fn new() -> Self {
        let mut heap = Self {
            values: Vec::with_capacity(64),
        };
        heap.values.push(HeapValue::Undefined);
        heap.values.push(HeapValue::Null);
        heap.values.push(HeapValue::Boolean(true));
        heap.values.push(HeapValue::Boolean(false));
        heap.values
            .push(HeapValue::Object(ObjectData::new(ObjectClass::Plain, None)));
        heap
    }

    pub(crate) fn alloc(&mut self, value: HeapValue) -> usize {
        self.values.push(value);
        self.values.len() - 1
    }

    pub(crate) fn alloc_number(&mut self, n: f64) -> usize {
        self.alloc(HeapValue::Number(n))
    }

    pub(crate) fn alloc_string(&mut self, bytes: &[u8]) -> usize {
        self.alloc(HeapValue::String(String::from_utf8_lossy(bytes).into_owned()))
    }

    pub(crate) fn alloc_object(&mut self, class: ObjectClass) -> usize {
        self.alloc(HeapValue::Object(ObjectData::new(
            class,
            Some(OBJECT_PROTOTYPE),
        )))
    }

    pub(crate) fn object(&self, index: usize) -> Option<&ObjectData> {
        match self.values.get(index)? {
            HeapValue::Object(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn object_mut(&mut self, index: usize) -> Option<&mut ObjectData> {
        match self.values.get_mut(index)? {
            HeapValue::Object(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn kind(&self, index: usize) -> BridgeValueKind {
        match self.values.get(index) {
            None | Some(HeapValue::Undefined) => K_BRIDGE_KIND_UNDEFINED,
            Some(HeapValue::Null) => K_BRIDGE_KIND_NULL,
            Some(HeapValue::Boolean(_)) => K_BRIDGE_KIND_BOOLEAN,
            Some(HeapValue::Number(_)) => K_BRIDGE_KIND_NUMBER,
            Some(HeapValue::String(_)) => K_BRIDGE_KIND_STRING,
            Some(HeapValue::Object(data)) => match data.class {
                ObjectClass::Plain => K_BRIDGE_KIND_OBJECT,
                ObjectClass::Array { .. } => K_BRIDGE_KIND_ARRAY,
                ObjectClass::Function { .. } => K_BRIDGE_KIND_FUNCTION,
                ObjectClass::RegExp { .. } => K_BRIDGE_KIND_REGEXP,
            },
        }
    }

    /// Walk `start` and its prototypes, stopping at the first object for
    /// which `visit` returns `Some`.
    fn walk_chain<T>(
        &self,
        start: usize,
        mut visit: impl FnMut(usize, &ObjectData) -> Option<T>,
    ) -> Option<T> {
        let mut current = Some(start);
        for _ in 0..MAX_CHAIN_DEPTH {
            let index = current?;
            let data = self.object(index)?;
            if let Some(found) = visit(index, data) {
                return Some(found);
            }
            current = data.prototype;
        }
        None
    }

    pub(crate) fn lookup_get(&mut self, object: usize, key: &str) -> GetLookup {
        enum Found {
            Property(Property, usize),
            Length(u32),
        }

        let found = self.walk_chain(object, |holder, data| {
            if let Some(property) = data.properties.get(key) {
                return Some(Found::Property(*property, holder));
            }
            match data.class {
                ObjectClass::Array { length } if key == "length" => Some(Found::Length(length)),
                _ => None,
            }
        });

        match found {
            Some(Found::Property(Property::Data { value, .. }, _)) => GetLookup::Value(value),
            Some(Found::Property(Property::Accessor { getter, .. }, holder)) => {
                GetLookup::Getter { getter, holder }
            }
            // Array length is synthesized rather than stored
            Some(Found::Length(length)) => GetLookup::Value(self.alloc_number(f64::from(length))),
            None => GetLookup::Value(UNDEFINED),
        }
    }

    pub(crate) fn lookup_set(&self, object: usize, key: &str) -> SetLookup {
        let found = self.walk_chain(object, |holder, data| {
            let property = data.properties.get(key)?;
            Some(match *property {
                Property::Accessor { setter: 0, .. } => SetLookup::Rejected,
                Property::Accessor { setter, .. } => SetLookup::Setter { setter, holder },
                Property::Data { .. } if property.has(K_BRIDGE_PROPERTY_ATTRIBUTE_READ_ONLY) => {
                    SetLookup::Rejected
                }
                Property::Data { .. } => SetLookup::Define,
            })
        });
        found.unwrap_or(SetLookup::Define)
    }

    pub(crate) fn has_property(&self, object: usize, key: &str) -> bool {
        self.walk_chain(object, |_, data| {
            let is_length = key == "length" && matches!(data.class, ObjectClass::Array { .. });
            (data.properties.contains_key(key) || is_length).then_some(())
        })
        .is_some()
    }

    pub(crate) fn own_property(&self, object: usize, key: &str) -> Option<Property> {
        self.object(object)?.properties.get(key).copied()
    }

    pub(crate) fn define(&mut self, object: usize, key: &str, property: Property) -> bool {
        match self.object_mut(object) {
            Some(data) => {
                data.properties.insert(key.to_string(), property);
                true
            }
            None => false,
        }
    }

    pub(crate) fn delete(&mut self, object: usize, key: &str, force: bool) -> bool {
        let Some(data) = self.object_mut(object) else {
            return false;
        };
        match data.properties.get(key) {
            None => true,
            Some(property) if !force && property.has(K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_DELETE) => {
                false
            }
            Some(_) => {
                data.properties.shift_remove(key);
                true
            }
        }
    }

    pub(crate) fn set_element(&mut self, object: usize, index: u32, value: usize) -> bool {
        let Some(data) = self.object_mut(object) else {
            return false;
        };
        data.elements.insert(index, value);
        if let ObjectClass::Array { length } = &mut data.class {
            *length = (*length).max(index.saturating_add(1));
        }
        true
    }

    pub(crate) fn get_element(&self, object: usize, index: u32) -> usize {
        self.walk_chain(object, |_, data| data.elements.get(&index).copied())
            .unwrap_or(UNDEFINED)
    }

    pub(crate) fn has_element(&self, object: usize, index: u32) -> bool {
        self.walk_chain(object, |_, data| data.elements.contains_key(&index).then_some(()))
            .is_some()
    }

    pub(crate) fn delete_element(&mut self, object: usize, index: u32) -> bool {
        match self.object_mut(object) {
            Some(data) => {
                data.elements.remove(&index);
                true
            }
            None => false,
        }
    }

    /// Enumerable names: integer keys ascending, then named properties in
    /// insertion order, for `object` and optionally its prototypes.
    pub(crate) fn enumerable_names(&self, object: usize, include_prototypes: bool) -> Vec<String> {
        let mut names = IndexSet::new();
        let _ = self.walk_chain(object, |_, data| {
            names.extend(data.elements.keys().map(u32::to_string));
            names.extend(
                data.properties
                    .iter()
                    .filter(|(_, p)| !p.has(K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_ENUM))
                    .map(|(name, _)| name.clone()),
            );
            (!include_prototypes).then_some(())
        });
        names.into_iter().collect()
    }

    /// False when `prototype` would make the chain cyclic
    pub(crate) fn set_prototype(&mut self, object: usize, prototype: Option<usize>) -> bool {
        if let Some(proto) = prototype {
            if self.object(proto).is_none() {
                return false;
            }
            let cyclic = self
                .walk_chain(proto, |index, _| (index == object).then_some(()))
                .is_some();
            if cyclic {
                return false;
            }
        }
        match self.object_mut(object) {
            Some(data) => {
                data.prototype = prototype;
                true
            }
            None => false,
        }
    }

    pub(crate) fn to_boolean(&self, index: usize) -> bool {
        match self.values.get(index) {
            None | Some(HeapValue::Undefined | HeapValue::Null) => false,
            Some(HeapValue::Boolean(b)) => *b,
            Some(HeapValue::Number(n)) => *n != 0.0 && !n.is_nan(),
            Some(HeapValue::String(s)) => !s.is_empty(),
            Some(HeapValue::Object(_)) => true,
        }
    }

    pub(crate) fn to_number(&self, index: usize) -> f64 {
        match self.values.get(index) {
            None | Some(HeapValue::Undefined | HeapValue::Object(_)) => f64::NAN,
            Some(HeapValue::Null) => 0.0,
            Some(HeapValue::Boolean(b)) => f64::from(u8::from(*b)),
            Some(HeapValue::Number(n)) => *n,
            Some(HeapValue::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    pub(crate) fn to_display(&self, index: usize) -> String {
        self.display(index, 0)
    }

    fn display(&self, index: usize, depth: usize) -> String {
        match self.values.get(index) {
            None | Some(HeapValue::Undefined) => "undefined".to_string(),
            Some(HeapValue::Null) => "null".to_string(),
            Some(HeapValue::Boolean(b)) => b.to_string(),
            Some(HeapValue::Number(n)) => number_to_string(*n),
            Some(HeapValue::String(s)) => s.clone(),
            Some(HeapValue::Object(data)) => match &data.class {
                ObjectClass::Plain => "[object Object]".to_string(),
                ObjectClass::Function { .. } => "function () { [native code] }".to_string(),
                ObjectClass::RegExp { source, flags } => {
                    format!("/{}/{}", source, flags_to_string(*flags, true))
                }
                ObjectClass::Array { length } if depth < 8 => (0..*length)
                    .map(|i| match data.elements.get(&i) {
                        Some(&v) if v != UNDEFINED && v != NULL => self.display(v, depth + 1),
                        _ => String::new(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                ObjectClass::Array { .. } => String::new(),
            },
        }
    }

    pub(crate) fn strict_equals(&self, a: usize, b: usize) -> bool {
        if a == b {
            return !matches!(self.values.get(a), Some(HeapValue::Number(n)) if n.is_nan());
        }
        match (self.values.get(a), self.values.get(b)) {
            (Some(HeapValue::Number(x)), Some(HeapValue::Number(y))) => x == y,
            (Some(HeapValue::String(x)), Some(HeapValue::String(y))) => x == y,
            (Some(HeapValue::Boolean(x)), Some(HeapValue::Boolean(y))) => x == y,
            (Some(HeapValue::Undefined), Some(HeapValue::Undefined))
            | (Some(HeapValue::Null), Some(HeapValue::Null)) => true,
            _ => false,
        }
    }
}

/// Script number formatting for the common cases
/// 2^53; whole numbers below it convert to `i64` exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < MAX_SAFE_INTEGER {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// `/.../gim` flag letters. Without `include_global` only the letters that
/// affect matching are produced.
pub(crate) fn flags_to_string(flags: BridgeRegExpFlags, include_global: bool) -> String {
    let mut out = String::new();
    if include_global && flags & K_BRIDGE_REGEXP_GLOBAL != 0 {
        out.push('g');
    }
    if flags & K_BRIDGE_REGEXP_IGNORE_CASE != 0 {
        out.push('i');
    }
    if flags & K_BRIDGE_REGEXP_MULTILINE != 0 {
        out.push('m');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_round_trip_keeps_null_free() {
        assert!(!to_ref(UNDEFINED).is_null());
        assert_eq!(from_ref(to_ref(42)), Some(42));
        assert_eq!(from_ref(ptr::null_mut()), None);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(5.0), "5");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(2.5), "2.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
        assert_eq!(number_to_string(-1e19), "-10000000000000000000");
        assert_eq!(number_to_string(9_007_199_254_740_991.0), "9007199254740991");
    }

    #[test]
    fn test_prototype_cycle_rejected() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(ObjectClass::Plain);
        let b = heap.alloc_object(ObjectClass::Plain);
        assert!(heap.set_prototype(b, Some(a)));
        assert!(!heap.set_prototype(a, Some(b)));
        assert!(!heap.set_prototype(a, Some(a)));
    }

    #[test]
    fn test_array_length_tracks_highest_element() {
        let mut heap = Heap::new();
        let array = heap.alloc_object(ObjectClass::Array { length: 2 });
        assert!(heap.set_element(array, 5, TRUE));
        let GetLookup::Value(length) = heap.lookup_get(array, "length") else {
            panic!("length is a plain value");
        };
        assert_eq!(heap.to_number(length), 6.0);
    }

    #[test]
    fn test_enumerable_names_skip_dont_enum_and_dedupe() {
        let mut heap = Heap::new();
        let proto = heap.alloc_object(ObjectClass::Plain);
        let object = heap.alloc_object(ObjectClass::Plain);
        heap.set_prototype(object, Some(proto));

        let data = |attributes| Property::Data {
            value: TRUE,
            attributes,
        };
        heap.define(proto, "shared", data(0));
        heap.define(proto, "inherited", data(0));
        heap.define(object, "own", data(0));
        heap.define(object, "shared", data(0));
        heap.define(object, "hidden", data(K_BRIDGE_PROPERTY_ATTRIBUTE_DONT_ENUM));
        heap.set_element(object, 1, TRUE);

        assert_eq!(heap.enumerable_names(object, false), ["1", "own", "shared"]);
        assert_eq!(
            heap.enumerable_names(object, true),
            ["1", "own", "shared", "inherited"]
        );
    }

    #[test]
    fn test_read_only_and_setterless_writes_rejected() {
        let mut heap = Heap::new();
        let object = heap.alloc_object(ObjectClass::Plain);
        heap.define(
            object,
            "fixed",
            Property::Data {
                value: TRUE,
                attributes: K_BRIDGE_PROPERTY_ATTRIBUTE_READ_ONLY,
            },
        );
        heap.define(
            object,
            "computed",
            Property::Accessor {
                getter: 0x10,
                setter: 0,
                access_control: K_BRIDGE_ACCESS_CONTROL_DEFAULT,
                attributes: 0,
            },
        );
        assert!(matches!(heap.lookup_set(object, "fixed"), SetLookup::Rejected));
        assert!(matches!(heap.lookup_set(object, "computed"), SetLookup::Rejected));
        assert!(matches!(heap.lookup_set(object, "fresh"), SetLookup::Define));
    }
}
