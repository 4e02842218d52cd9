//! Instances of server-defined object and collection types

use super::{Codec, ColumnType, FromValue, ToValue, Value};
use crate::{Error, Result};
use std::{fmt, sync::Arc};

/// Object type attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    attr_type: ColumnType,
}

impl Attribute {
    pub fn new(name: &str, attr_type: ColumnType) -> Self {
        Self { name: name.to_uppercase(), attr_type }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr_type(&self) -> &ColumnType {
        &self.attr_type
    }
}

/**
    Schema of a named server type: either an object with an ordered list of
    attributes, or a collection of elements of a single type.

    Types are described once per pool (see [`Connection::object_type`](crate::Connection::object_type))
    and shared afterwards.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    name: String,
    attrs: Vec<Attribute>,
    element: Option<ColumnType>,
}

impl ObjectType {
    /// Describes an object type
    pub fn object(name: &str, attrs: Vec<Attribute>) -> Self {
        Self { name: name.to_uppercase(), attrs, element: None }
    }

    /// Describes a collection (nested table or varray) type
    pub fn collection(name: &str, element: ColumnType) -> Self {
        Self { name: name.to_uppercase(), attrs: Vec::new(), element: Some(element) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn element_type(&self) -> Option<&ColumnType> {
        self.element.as_ref()
    }

    pub fn is_collection(&self) -> bool {
        self.element.is_some()
    }

    fn attr_index(&self, name: &str) -> Option<usize> {
        self.attrs.iter().position(|attr| attr.name.eq_ignore_ascii_case(name))
    }

    /// Returns a new object of this type with all attributes set to NULL.
    pub fn new_object(self: &Arc<Self>) -> Result<Object> {
        if self.is_collection() {
            return Err(Error::msg(format!("{} is a collection type", self.name)));
        }
        Ok(Object { otype: self.clone(), values: vec![Value::Null; self.attrs.len()] })
    }

    /// Returns a new empty collection of this type.
    pub fn new_collection(self: &Arc<Self>) -> Result<Collection> {
        if !self.is_collection() {
            return Err(Error::msg(format!("{} is not a collection type", self.name)));
        }
        Ok(Collection { otype: self.clone(), items: Vec::new() })
    }
}

/**
    An instance of an object type.

    # Example

    ```
    use augur::{Attribute, ColumnType, ObjectType, Number};
    use std::sync::Arc;

    let rec = Arc::new(ObjectType::object("test_pkg_rec", vec![
        Attribute::new("id", ColumnType::Number),
        Attribute::new("txt", ColumnType::Varchar),
    ]));
    let mut obj = rec.new_object()?;
    obj.set("ID", 42)?;
    obj.set("txt", "answer")?;
    assert_eq!(obj.get::<i64>("id")?, 42);
    assert_eq!(obj.get::<Option<String>>("TXT")?.as_deref(), Some("answer"));
    assert!(obj.set("missing", 1).is_err());
    # Ok::<(),augur::Error>(())
    ```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    otype: Arc<ObjectType>,
    values: Vec<Value>,
}

impl Object {
    pub fn object_type(&self) -> &Arc<ObjectType> {
        &self.otype
    }

    pub fn type_name(&self) -> &str {
        &self.otype.name
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.otype.attr_index(name).ok_or_else(|| {
            Error::msg(format!("{} does not have attribute {}", self.otype.name, name))
        })
    }

    /// Sets the value of the named attribute.
    pub fn set(&mut self, name: &str, val: impl ToValue) -> Result<()> {
        let ix = self.index_of(name)?;
        let val = val.to_value(&Codec::default())?;
        let attr = &self.otype.attrs[ix];
        if !attr.attr_type.accepts(&val) {
            return Err(Error::mismatch(format!("{} cannot be assigned to {}.{} of type {}", val.kind(), self.otype.name, attr.name, attr.attr_type)));
        }
        self.values[ix] = val;
        Ok(())
    }

    /// Returns the value of the named attribute converted to `T`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        let ix = self.index_of(name)?;
        T::from_value(&self.values[ix], &Codec::default())
    }

    /// Returns the raw value of the named attribute.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.otype.attr_index(name).map(|ix| &self.values[ix])
    }

    /// Returns attribute values in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Builds an object from attribute values in declaration order.
    pub fn from_values(otype: &Arc<ObjectType>, values: Vec<Value>) -> Result<Self> {
        let mut obj = otype.new_object()?;
        if values.len() != otype.attrs.len() {
            return Err(Error::mismatch(format!("{} has {} attributes, got {} values", otype.name, otype.attrs.len(), values.len())));
        }
        for (ix, val) in values.into_iter().enumerate() {
            let attr = &otype.attrs[ix];
            if !attr.attr_type.accepts(&val) {
                return Err(Error::mismatch(format!("{} cannot be assigned to {}.{}", val.kind(), otype.name, attr.name)));
            }
            obj.values[ix] = val;
        }
        Ok(obj)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.otype.name)?;
        for (i, (attr, val)) in self.otype.attrs.iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", attr.name, val)?;
        }
        f.write_str(")")
    }
}

/// An instance of a collection type
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    otype: Arc<ObjectType>,
    items: Vec<Value>,
}

impl Collection {
    pub fn object_type(&self) -> &Arc<ObjectType> {
        &self.otype
    }

    pub fn type_name(&self) -> &str {
        &self.otype.name
    }

    /// Appends an element to the end of the collection.
    pub fn push(&mut self, val: impl ToValue) -> Result<()> {
        let val = val.to_value(&Codec::default())?;
        if let Some(elem_type) = &self.otype.element {
            if !elem_type.accepts(&val) {
                return Err(Error::mismatch(format!("{} cannot be an element of {}", val.kind(), self.otype.name)));
            }
        }
        self.items.push(val);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the element at zero-based `index` converted to `T`.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let val = self.items.get(index).ok_or_else(|| {
            Error::msg(format!("index {} is out of range of {} elements", index, self.items.len()))
        })?;
        T::from_value(val, &Codec::default())
    }

    pub fn values(&self) -> &[Value] {
        &self.items
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.otype.name)?;
        for (i, val) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", val)?;
        }
        f.write_str(")")
    }
}
