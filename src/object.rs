#![forbid(unsafe_code)]
use crate::{
    data::{DataType, Value},
    error::ConversionError,
};
use std::{any::Any, fmt};

////////////////////////////////////////////////////////////////////////////////

/// A type whose members are bound to table columns.
///
/// Usually implemented with `#[derive(Object)]`. Hand-written impls can
/// register method-style, read-only or write-only accessors.
pub trait Object: Any + Sized {
    const TYPE_NAME: &'static str;
    const TABLE_NAME: &'static str;
    const COLUMN_ALIAS_PREFIX: Option<&'static str> = None;

    /// Column name to accessor, in declaration order.
    fn accessors() -> Vec<(&'static str, Accessor<Self>)>;

    /// Designated constructors. More than one is a configuration error.
    fn constructors() -> Vec<Constructor<Self>> {
        Vec::new()
    }

    /// Zero-argument construction used by setter-based materialization.
    fn instantiate() -> Option<Self> {
        None
    }
}

////////////////////////////////////////////////////////////////////////////////

pub type Getter<T> = fn(&T) -> Value;
pub type Setter<T> = fn(&mut T, Value) -> Result<(), ConversionError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    ReadWrite,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mechanism {
    Field(&'static str),
    Method {
        getter: Option<&'static str>,
        setter: Option<&'static str>,
    },
}

/// Uniform get/set access to one member, whether it is a field or a pair of
/// methods.
pub struct Accessor<T> {
    data_type: DataType,
    mechanism: Mechanism,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
}

impl<T> Accessor<T> {
    pub fn field(name: &'static str, data_type: DataType, getter: Getter<T>, setter: Setter<T>) -> Self {
        Self {
            data_type,
            mechanism: Mechanism::Field(name),
            getter: Some(getter),
            setter: Some(setter),
        }
    }

    /// Starts a method-style accessor; add a getter and/or a setter.
    pub fn method(data_type: DataType) -> Self {
        Self {
            data_type,
            mechanism: Mechanism::Method {
                getter: None,
                setter: None,
            },
            getter: None,
            setter: None,
        }
    }

    pub fn with_getter(mut self, name: &'static str, getter: Getter<T>) -> Self {
        if let Mechanism::Method { getter: g, .. } = &mut self.mechanism {
            *g = Some(name);
        }
        self.getter = Some(getter);
        self
    }

    pub fn with_setter(mut self, name: &'static str, setter: Setter<T>) -> Self {
        if let Mechanism::Method { setter: s, .. } = &mut self.mechanism {
            *s = Some(name);
        }
        self.setter = Some(setter);
        self
    }

    /// `None` for a method accessor that was given neither a getter nor a
    /// setter.
    pub fn capability(&self) -> Option<Capability> {
        match (self.getter.is_some(), self.setter.is_some()) {
            (true, true) => Some(Capability::ReadWrite),
            (true, false) => Some(Capability::Read),
            (false, true) => Some(Capability::Write),
            (false, false) => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// `None` when the member cannot be read.
    pub fn get(&self, object: &T) -> Option<Value> {
        self.getter.map(|getter| getter(object))
    }

    /// Writing through a read-only accessor is a no-op.
    pub fn set(&self, object: &mut T, value: Value) -> Result<(), ConversionError> {
        match self.setter {
            Some(setter) => setter(object, value),
            None => Ok(()),
        }
    }
}

impl<T> fmt::Display for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mechanism {
            Mechanism::Field(name) => write!(f, "field {} {}", self.data_type, name),
            Mechanism::Method { getter, setter } => {
                let getter = getter.map_or("-".to_string(), |g| format!("{}()", g));
                let setter = setter.map_or("-".to_string(), |s| format!("{}({})", s, self.data_type));
                write!(f, "getter=[{}], setter=[{}]", getter, setter)
            }
        }
    }
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("data_type", &self.data_type)
            .field("mechanism", &self.mechanism)
            .field("capability", &self.capability())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructorParameter {
    pub name: &'static str,
    pub data_type: DataType,
}

impl ConstructorParameter {
    pub fn new(name: &'static str, data_type: DataType) -> Self {
        Self { name, data_type }
    }
}

pub type ConstructorFn<T> = fn(Vec<Value>) -> Result<T, ConversionError>;

/// A constructor taking one argument per parameter, in declared order.
/// Parameters without a matching column receive `Value::Null`.
pub struct Constructor<T> {
    parameters: Vec<ConstructorParameter>,
    invoke: ConstructorFn<T>,
}

impl<T> Constructor<T> {
    pub fn new(parameters: Vec<ConstructorParameter>, invoke: ConstructorFn<T>) -> Self {
        Self { parameters, invoke }
    }

    pub fn parameters(&self) -> &[ConstructorParameter] {
        &self.parameters
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<T, ConversionError> {
        (self.invoke)(args)
    }
}

impl<T> fmt::Display for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "new({})", params)
    }
}
