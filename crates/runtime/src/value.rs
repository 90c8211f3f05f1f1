//! Script values and heap objects.

use std::{
    cell::{Ref, RefCell, RefMut},
    collections::BTreeMap,
    fmt,
    rc::Rc,
};

use esprof_syntax::{format_number, print_expression, Expression, Function as FunctionNode};
use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::{
    error::{Result, RuntimeError},
    interpreter::{Interpreter, ScopeRef},
};

/// Signature of functions implemented in Rust: interpreter, receiver, arguments.
pub type NativeFn = Rc<dyn Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value>>;

#[derive(Clone)]
pub enum Callable {
    Script { node: Rc<FunctionNode>, scope: ScopeRef },
    Native { name: String, call: NativeFn },
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Self::Script { node, .. } => node.name().unwrap_or(""),
            Self::Native { name, .. } => name,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script { .. })
    }
}

pub enum ObjectKind {
    Ordinary,
    Array(Elements),
    /// The `arguments` object of a call.
    Arguments(Elements),
    Function(Callable),
    Error,
    RegExp(RegExp),
}

/// Largest run of holes a single write may add to the dense part of an array.
const MAX_DENSE_GAP: usize = 1024;
/// Largest length up to which a sparse array is expanded into a list.
const MAX_EXPANDED_LENGTH: usize = 1 << 24;
/// Largest valid array length, `2^32 - 1`.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Indexed elements of an array or `arguments` object.
///
/// Elements near the front live in a vector; writes far past its end go to an ordered map, so
/// `a[4000000000] = 1` costs one entry rather than billions of holes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Elements {
    /// `None` marks a hole.
    dense: Vec<Option<Value>>,
    sparse: BTreeMap<usize, Value>,
    length: usize,
}

impl Elements {
    /// An array of `length` holes.
    pub fn with_length(length: usize) -> Self {
        Self { length, ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The element stored at `index`, `None` for holes and indices past the length.
    pub fn get(&self, index: usize) -> Option<Value> {
        match self.dense.get(index) {
            Some(slot) => slot.clone(),
            None => self.sparse.get(&index).cloned(),
        }
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if index < self.dense.len() {
            self.dense[index] = Some(value);
        } else if index - self.dense.len() <= MAX_DENSE_GAP {
            self.sparse.remove(&index);
            self.dense.resize(index, None);
            self.dense.push(Some(value));
            // Move entries the dense part has grown over.
            let rest = self.sparse.split_off(&self.dense.len());
            for (i, value) in std::mem::replace(&mut self.sparse, rest) {
                self.dense[i] = Some(value);
            }
        } else {
            self.sparse.insert(index, value);
        }
        self.length = self.length.max(index + 1);
    }

    /// Truncate or extend to `length`. Extending adds holes without storing them.
    pub fn set_length(&mut self, length: usize) {
        self.dense.truncate(length);
        self.sparse.split_off(&length);
        self.length = length;
    }

    /// Turn the element at `index` into a hole.
    pub fn remove(&mut self, index: usize) {
        match self.dense.get_mut(index) {
            Some(slot) => *slot = None,
            None => {
                self.sparse.remove(&index);
            }
        }
    }

    pub fn push(&mut self, value: Value) {
        self.set(self.length, value);
    }

    pub fn pop(&mut self) -> Value {
        let Some(last) = self.length.checked_sub(1) else {
            return Value::Undefined;
        };
        let value = self.get(last).unwrap_or_default();
        self.set_length(last);
        value
    }

    /// Indices that hold an element, in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        let dense = self.dense.iter().enumerate().filter(|(_, slot)| slot.is_some()).map(|(i, _)| i);
        dense.chain(self.sparse.keys().copied())
    }

    /// Every element up to the length, holes read as `undefined`.
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        if self.length > self.dense.len() && self.length > MAX_EXPANDED_LENGTH {
            return Err(RuntimeError::Range("Invalid array length".to_string()));
        }
        Ok((0..self.length).map(|i| self.get(i).unwrap_or_default()).collect())
    }
}

impl From<Vec<Value>> for Elements {
    fn from(values: Vec<Value>) -> Self {
        let length = values.len();
        Self { dense: values.into_iter().map(Some).collect(), sparse: BTreeMap::new(), length }
    }
}

/// Array length denoted by `value`, `None` unless it is an integer in `0..=2^32 - 1`.
pub fn array_length(value: &Value) -> Option<usize> {
    let length = value.to_number_primitive();
    (length >= 0.0 && length.fract() == 0.0 && length <= MAX_ARRAY_LENGTH as f64)
        .then_some(length as usize)
}

/// A compiled regular expression with the flags it was created with.
#[derive(Clone, Debug)]
pub struct RegExp {
    pub source: String,
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
    pub regex: regex::Regex,
}

impl RegExp {
    pub fn new(source: &str, flags: &str) -> std::result::Result<Self, String> {
        let mut global = false;
        let mut ignore_case = false;
        let mut multiline = false;
        for flag in flags.chars() {
            let seen = match flag {
                'g' => &mut global,
                'i' => &mut ignore_case,
                'm' => &mut multiline,
                other => return Err(format!("Invalid regular expression flags '{other}'")),
            };
            if std::mem::replace(seen, true) {
                return Err(format!("Invalid regular expression flags '{flags}'"));
            }
        }
        let regex = regex::RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .multi_line(multiline)
            .build()
            .map_err(|err| format!("Invalid regular expression: /{source}/: {err}"))?;
        Ok(Self { source: source.to_string(), global, ignore_case, multiline, regex })
    }

    pub fn flags(&self) -> String {
        [(self.global, 'g'), (self.ignore_case, 'i'), (self.multiline, 'm')]
            .into_iter()
            .filter_map(|(set, flag)| set.then_some(flag))
            .collect()
    }
}

#[derive(Clone, Debug)]
struct Property {
    value: Value,
    enumerable: bool,
}

/// Own properties in insertion order.
#[derive(Default)]
struct PropertyMap {
    index: FxHashMap<String, usize>,
    entries: Vec<(String, Property)>,
}

impl PropertyMap {
    fn get(&self, key: &str) -> Option<&Property> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn insert(&mut self, key: String, property: Property) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1.value = property.value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, property));
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        let Some(i) = self.index.remove(key) else {
            return false;
        };
        self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        true
    }

    fn enumerable_keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().filter(|(_, p)| p.enumerable).map(|(k, _)| k)
    }
}

/// Parse a property key that denotes an array index.
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|&i| i != u32::MAX).map(|i| i as usize)
}

pub struct Object {
    pub kind: ObjectKind,
    pub prototype: Option<ObjectRef>,
    properties: PropertyMap,
}

impl Object {
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self { kind, prototype, properties: PropertyMap::default() }
    }

    pub fn class_name(&self) -> &'static str {
        match self.kind {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Arguments(_) => "Arguments",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::RegExp(_) => "RegExp",
        }
    }

    pub fn elements(&self) -> Option<&Elements> {
        match &self.kind {
            ObjectKind::Array(elements) | ObjectKind::Arguments(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn elements_mut(&mut self) -> Option<&mut Elements> {
        match &mut self.kind {
            ObjectKind::Array(elements) | ObjectKind::Arguments(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn get_own(&self, key: &str) -> Option<Value> {
        if let Some(elements) = self.elements() {
            if key == "length" {
                return Some(Value::Number(elements.len() as f64));
            }
            if let Some(i) = array_index(key) {
                return elements.get(i);
            }
        }
        if let ObjectKind::RegExp(regexp) = &self.kind {
            match key {
                "source" => return Some(Value::from(regexp.source.as_str())),
                "global" => return Some(Value::Boolean(regexp.global)),
                "ignoreCase" => return Some(Value::Boolean(regexp.ignore_case)),
                "multiline" => return Some(Value::Boolean(regexp.multiline)),
                _ => {}
            }
        }
        if let ObjectKind::Function(callable) = &self.kind {
            match key {
                "length" => {
                    let arity = match callable {
                        Callable::Script { node, .. } => node.params.len(),
                        Callable::Native { .. } => 0,
                    };
                    return Some(Value::Number(arity as f64));
                }
                "name" => return Some(Value::from(callable.name())),
                _ => {}
            }
        }
        self.properties.get(key).map(|p| p.value.clone())
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.get_own(key).is_some()
    }

    /// Create or update an enumerable own property.
    ///
    /// An invalid array length is ignored here; [`Interpreter::put_property`] reports it.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(elements) = self.elements_mut() {
            if key == "length" {
                if let Some(length) = array_length(&value) {
                    elements.set_length(length);
                }
                return;
            }
            if let Some(i) = array_index(&key) {
                elements.set(i, value);
                return;
            }
        }
        self.properties.insert(key, Property { value, enumerable: true });
    }

    /// Create a property that `for-in` and `Object.keys` skip.
    pub fn define_hidden(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), Property { value, enumerable: false });
    }

    pub fn delete(&mut self, key: &str) -> bool {
        if let Some(elements) = self.elements_mut() {
            if let Some(i) = array_index(key) {
                elements.remove(i);
                return true;
            }
        }
        self.properties.remove(key)
    }

    /// Enumerable own keys: stored array indices first, then properties in insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        let indices = self.elements().into_iter().flat_map(Elements::indices);
        indices.map(|i| i.to_string()).chain(self.properties.enumerable_keys().cloned()).collect()
    }
}

/// Shared handle to a heap object. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Object>>);

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn callable(&self) -> Option<Callable> {
        match &self.borrow().kind {
            ObjectKind::Function(callable) => Some(callable.clone()),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Function(_))
    }

    /// Look a property up along the prototype chain.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            let object = object.borrow();
            if let Some(value) = object.get_own(key) {
                return Some(value);
            }
            current = object.prototype.clone();
        }
        None
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Enumerable keys of the object and its prototypes, each reported once.
    pub fn enumerable_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let mut current = Some(self.clone());
        while let Some(object) = current {
            let object = object.borrow();
            for key in object.own_keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            current = object.prototype.clone();
        }
        keys
    }

    /// Whether `prototype` appears on this object's prototype chain.
    pub fn inherits_from(&self, prototype: &Self) -> bool {
        let mut current = self.borrow().prototype.clone();
        while let Some(object) = current {
            if object.ptr_eq(prototype) {
                return true;
            }
            current = object.borrow().prototype.clone();
        }
        false
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {}]", self.borrow().class_name())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(ObjectRef::is_callable)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(object) if object.is_callable() => "function",
            Self::Object(_) => "object",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Object(_) => true,
        }
    }

    /// Numeric conversion without running script code; objects convert through their default
    /// string form.
    pub fn to_number_primitive(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Object(_) => string_to_number(&self.to_string()),
        }
    }

    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            _ => self == other,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Object(object)
    }
}

/// The default string form of a value, as produced without calling any script method.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::Object(object) => {
                if matches!(object.borrow().kind, ObjectKind::Error) {
                    let name = object.get("name").unwrap_or_default();
                    return match object.get("message").unwrap_or_default() {
                        Self::Undefined => write!(f, "{name}"),
                        Self::String(m) if m.is_empty() => write!(f, "{name}"),
                        message => write!(f, "{name}: {message}"),
                    };
                }
                let object = object.borrow();
                match &object.kind {
                    ObjectKind::Array(elements) => {
                        // Too long to join; scripts get a RangeError from `join` instead.
                        let Ok(values) = elements.to_vec() else {
                            return f.write_str("[object Array]");
                        };
                        let text = values
                            .iter()
                            .map(|v| match v {
                                Self::Undefined | Self::Null => String::new(),
                                v => v.to_string(),
                            })
                            .join(",");
                        f.write_str(&text)
                    }
                    ObjectKind::RegExp(regexp) => write!(f, "/{}/{}", regexp.source, regexp.flags()),
                    ObjectKind::Function(Callable::Script { node, .. }) => {
                        f.write_str(&print_expression(&Expression::FunctionExpression((**node).clone())))
                    }
                    ObjectKind::Function(Callable::Native { name, .. }) => {
                        write!(f, "function {name}() {{ [native code] }}")
                    }
                    _ => write!(f, "[object {}]", object.class_name()),
                }
            }
        }
    }
}

/// Numeric value of a string, `NaN` when it is not a numeric literal.
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if s.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(values: Vec<Value>) -> ObjectRef {
        ObjectRef::new(Object::new(ObjectKind::Array(values.into()), None))
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("042"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }

    #[test]
    fn test_array_storage() {
        let a = array(vec![Value::from(1.0)]);
        a.borrow_mut().set("3", Value::from("x"));
        assert_eq!(a.get("length"), Some(Value::Number(4.0)));
        assert_eq!(a.get("1"), None);
        assert!(!a.borrow().has_own("2"));
        a.borrow_mut().set("length", Value::from(1.0));
        assert_eq!(Value::from(a.clone()).to_string(), "1");
        assert_eq!(a.borrow().own_keys(), vec!["0"]);
    }

    #[test]
    fn test_sparse_array_storage() {
        let a = array(Vec::new());
        a.borrow_mut().set("4000000000", Value::from(1.0));
        assert_eq!(a.get("length"), Some(Value::Number(4000000001.0)));
        assert_eq!(a.get("4000000000"), Some(Value::Number(1.0)));
        assert_eq!(a.get("7"), None);
        a.borrow_mut().set("2", Value::from("near"));
        assert_eq!(a.borrow().own_keys(), vec!["2", "4000000000"]);
        assert!(a.borrow_mut().delete("2"));
        assert_eq!(a.borrow().own_keys(), vec!["4000000000"]);
        a.borrow_mut().set("2", Value::from("near"));

        a.borrow_mut().set("length", Value::from(1e12));
        assert_eq!(a.get("length"), Some(Value::Number(4000000001.0)));
        a.borrow_mut().set("length", Value::from(3.0));
        assert_eq!(a.get("4000000000"), None);
        assert_eq!(Value::from(a.clone()).to_string(), ",,near");
    }

    #[test]
    fn test_dense_part_absorbs_sparse_entries() {
        let mut elements = Elements::default();
        elements.set(1500, Value::from("far"));
        elements.set(1000, Value::from("mid"));
        elements.set(1010, Value::from("next"));
        elements.set(2000, Value::from("end"));
        assert_eq!(elements.len(), 2001);
        assert_eq!(elements.get(1500), Some(Value::from("far")));
        assert_eq!(elements.indices().collect::<Vec<_>>(), vec![1000, 1010, 1500, 2000]);
        assert_eq!(elements.pop(), Value::from("end"));
        assert_eq!(elements.len(), 2000);
    }

    #[test]
    fn test_huge_arrays_are_not_expanded() {
        let elements = Elements::with_length(MAX_ARRAY_LENGTH);
        assert!(matches!(elements.to_vec(), Err(RuntimeError::Range(_))));
        assert_eq!(Elements::with_length(3).to_vec().unwrap(), vec![Value::Undefined; 3]);
        assert_eq!(array_length(&Value::from(4294967295.0)), Some(MAX_ARRAY_LENGTH));
        assert_eq!(array_length(&Value::from(4294967296.0)), None);
        assert_eq!(array_length(&Value::from(-1.0)), None);
        assert_eq!(array_length(&Value::from(1.5)), None);
    }

    #[test]
    fn test_regexp_flags() {
        let regexp = RegExp::new("a+b", "gi").unwrap();
        assert_eq!(regexp.flags(), "gi");
        assert!(regexp.regex.is_match("xAAB"));
        assert!(RegExp::new("a", "gg").is_err());
        assert!(RegExp::new("a", "y").is_err());
        assert!(RegExp::new("(", "").is_err());
    }

    #[test]
    fn test_properties_keep_insertion_order() {
        let object = ObjectRef::new(Object::new(ObjectKind::Ordinary, None));
        object.borrow_mut().set("b", Value::from(1.0));
        object.borrow_mut().set("a", Value::from(2.0));
        object.borrow_mut().define_hidden("hidden", Value::Null);
        object.borrow_mut().set("c", Value::from(3.0));
        assert!(object.borrow_mut().delete("a"));
        assert_eq!(object.borrow().own_keys(), vec!["b", "c"]);
        assert_eq!(object.get("c"), Some(Value::Number(3.0)));
        assert!(object.has("hidden"));
    }

    #[test]
    fn test_prototype_chain() {
        let base = ObjectRef::new(Object::new(ObjectKind::Ordinary, None));
        base.borrow_mut().set("inherited", Value::from(true));
        let derived = ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(base.clone())));
        derived.borrow_mut().set("own", Value::Null);
        assert_eq!(derived.get("inherited"), Some(Value::Boolean(true)));
        assert_eq!(derived.enumerable_keys(), vec!["own", "inherited"]);
        assert!(derived.inherits_from(&base));
        assert!(!base.inherits_from(&derived));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(string_to_number(" 12.5 "), 12.5);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert_eq!(string_to_number(""), 0.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
        assert!(!Value::from("").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert_eq!(Value::Null.type_of(), "object");
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
    }
}
