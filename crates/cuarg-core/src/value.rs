//! Dynamically-typed values crossing into the marshaling layer.

use std::fmt;
use std::sync::Arc;

use crate::buffer::BufferSource;

/// Capability marker: a value that can report the address of its own raw
/// storage.
pub trait RawAddress: Send + Sync {
    /// Address handed to the driver for this value.
    fn raw_address(&self) -> usize;

    /// Name used in error messages.
    fn type_name(&self) -> &str {
        "pointer"
    }
}

/// A fixed-layout native structure passed to the driver by address.
pub trait NativeStruct: Send + Sync {
    fn type_name(&self) -> &str;

    /// The structure's bytes, laid out as the driver expects.
    fn as_bytes(&self) -> &[u8];

    fn address(&self) -> usize {
        self.as_bytes().as_ptr() as usize
    }
}

/// Symbolic enum value, packed as its ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub type_name: String,
    pub ordinal: i64,
}

impl EnumValue {
    pub fn new(type_name: impl Into<String>, ordinal: i64) -> Self {
        Self { type_name: type_name.into(), ordinal }
    }
}

/// A value from the dynamically-typed caller side.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    /// Any integer, wide enough for both `i64` and `u64` inputs.
    Int(i128),
    Float(f64),
    Float32(f32),
    Enum(EnumValue),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Pointer(Arc<dyn RawAddress>),
    Struct(Arc<dyn NativeStruct>),
    Buffer(Arc<dyn BufferSource>),
}

impl Value {
    /// Name of the value's type, as shown in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Float32(_) => "float32".into(),
            Value::Enum(e) => e.type_name.clone(),
            Value::Bytes(_) => "bytes".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Pointer(p) => p.type_name().to_string(),
            Value::Struct(s) => s.type_name().to_string(),
            Value::Buffer(b) => b.type_name().to_string(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn pointer(p: impl RawAddress + 'static) -> Self {
        Value::Pointer(Arc::new(p))
    }

    pub fn native(s: impl NativeStruct + 'static) -> Self {
        Value::Struct(Arc::new(s))
    }

    pub fn buffer(b: impl BufferSource + 'static) -> Self {
        Value::Buffer(Arc::new(b))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Float32(x) => write!(f, "Float32({x})"),
            Value::Enum(e) => write!(f, "{}({})", e.type_name, e.ordinal),
            Value::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Pointer(p) => write!(f, "{}({:#x})", p.type_name(), p.raw_address()),
            Value::Struct(s) => write!(f, "{}(size={})", s.type_name(), s.as_bytes().len()),
            Value::Buffer(b) => write!(f, "{}(buffer)", b.type_name()),
        }
    }
}

macro_rules! int_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i128)
            }
        })*
    };
}

int_from!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Value::Enum(v)
    }
}

/// A device address held in its own heap cell.
///
/// The raw address is the cell's address, so a kernel slot can point
/// straight at it.
#[derive(Debug, Clone)]
pub struct DevicePtr {
    cell: Box<u64>,
}

impl DevicePtr {
    pub fn new(address: u64) -> Self {
        Self { cell: Box::new(address) }
    }

    /// The device address stored in the cell.
    pub fn get(&self) -> u64 {
        *self.cell
    }
}

impl RawAddress for DevicePtr {
    fn raw_address(&self) -> usize {
        &*self.cell as *const u64 as usize
    }

    fn type_name(&self) -> &str {
        "DevicePtr"
    }
}

/// An address already resolved by the caller, e.g. from a foreign object's
/// pointer accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignAddress {
    type_name: String,
    address: usize,
}

impl ForeignAddress {
    pub fn new(type_name: impl Into<String>, address: usize) -> Self {
        Self { type_name: type_name.into(), address }
    }
}

impl RawAddress for ForeignAddress {
    fn raw_address(&self) -> usize {
        self.address
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}
