//! Attribute marshaling keyed by driver attribute enums.
//!
//! Each attribute family maps every selector to a native storage [`Shape`].
//! [`AttributeValue`] allocates that storage, fills it from a [`Value`] in
//! setter mode, exposes its address for the boundary call, and in getter
//! mode reads the driver-written result back as [`AttributeData`].

use std::ffi::{c_void, CString};
use std::fmt;
use std::mem::size_of;

use crate::alloc::{RawAllocator, RawBlock, SystemAllocator};
use crate::config::MarshalConfig;
use crate::param_type::ParamType;
use crate::pointer_array::PointerArray;
use crate::scalar::Scalar;
use crate::value::{RawAddress, Value};
use crate::{MarshalError, Result};

/// Declare an attribute enum and its exhaustive selector-to-shape table.
macro_rules! attribute_family {
    (
        $(#[$meta:meta])*
        pub enum $name:ident($label:literal, $passing:ident) {
            $($variant:ident = $raw:literal => $shape:expr,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum $name {
            $($variant = $raw,)*
        }

        impl $crate::attr::AttributeFamily for $name {
            const NAME: &'static str = $label;
            const PASSING: $crate::attr::Passing = $crate::attr::Passing::$passing;

            fn raw(self) -> i32 {
                self as i32
            }

            fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($raw => Some($name::$variant),)*
                    _ => None,
                }
            }

            fn shape(self) -> Option<$crate::attr::Shape> {
                match self {
                    $($name::$variant => $shape,)*
                }
            }
        }
    };
}

pub mod coredump;
pub mod handle;
pub mod handle_type;
pub mod jit;
pub mod mem_pool;
pub mod mem_range;
pub mod pointer;

pub use coredump::CoredumpSetting;
pub use handle::{FabricHandle, NativeCell, P2pTokens, FABRIC_HANDLE_SIZE};
pub use handle_type::MemAllocationHandleType;
pub use jit::JitOption;
pub use mem_pool::{GraphMemAttribute, MemPoolAttribute};
pub use mem_range::MemRangeAttribute;
pub use pointer::PointerAttribute;

/// Fixed-size handle structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    P2pTokens,
    Fabric,
}

/// Native storage layout for one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One byte, zero or one.
    Bool,
    Int32,
    UInt32,
    UInt64,
    Size,
    Float32,
    /// Pointer-width handle or address.
    Address,
    Handle(HandleKind),
    /// NUL-terminated string buffer.
    CString,
    /// Raw byte buffer.
    Bytes,
    /// Buffer of `int` values.
    Int32Array,
    /// `void**` of addresses.
    AddressList,
    /// `const char**` of NUL-terminated strings.
    StringList,
}

impl Shape {
    /// The scalar type stored for scalar shapes.
    pub fn scalar_type(self) -> Option<ParamType> {
        match self {
            Shape::Bool => Some(ParamType::Bool),
            Shape::Int32 => Some(ParamType::Int),
            Shape::UInt32 => Some(ParamType::UInt),
            Shape::UInt64 => Some(ParamType::ULongLong),
            Shape::Size => Some(ParamType::SizeT),
            Shape::Float32 => Some(ParamType::Float),
            Shape::Address => Some(ParamType::VoidPtr),
            _ => None,
        }
    }

    /// Whether storage size is chosen at construction.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Shape::CString | Shape::Bytes | Shape::Int32Array)
    }
}

/// How the boundary call receives the attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passing {
    /// The call gets a pointer to the storage.
    ByReference,
    /// Scalars travel inside the pointer slot itself.
    ByValue,
}

/// A closed family of attribute selectors.
pub trait AttributeFamily: Copy + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
    const PASSING: Passing;

    /// The selector's enum value in the driver headers.
    fn raw(self) -> i32;

    fn from_raw(raw: i32) -> Option<Self>;

    /// Storage layout, or `None` when the selector carries no marshalable
    /// value.
    fn shape(self) -> Option<Shape>;
}

/// A typed attribute value read back from native storage.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    UInt64(u64),
    Size(usize),
    Float32(f32),
    Address(usize),
    P2pTokens(P2pTokens),
    FabricHandle(FabricHandle),
    Text(String),
    Bytes(Vec<u8>),
    Int32List(Vec<i32>),
    Addresses(Vec<usize>),
}

enum HandleStorage {
    P2pTokens(NativeCell<P2pTokens>),
    Fabric(NativeCell<FabricHandle>),
}

impl HandleStorage {
    fn zeroed(kind: HandleKind) -> Self {
        match kind {
            HandleKind::P2pTokens => HandleStorage::P2pTokens(NativeCell::zeroed()),
            HandleKind::Fabric => HandleStorage::Fabric(NativeCell::zeroed()),
        }
    }

    fn address(&self) -> usize {
        match self {
            HandleStorage::P2pTokens(c) => c.address(),
            HandleStorage::Fabric(c) => c.address(),
        }
    }

    fn size(&self) -> usize {
        match self {
            HandleStorage::P2pTokens(_) => size_of::<P2pTokens>(),
            HandleStorage::Fabric(_) => size_of::<FabricHandle>(),
        }
    }
}

enum Storage<A: RawAllocator> {
    Scalar(NativeCell<u64>),
    Handle(HandleStorage),
    Buffer { block: RawBlock<A>, size: NativeCell<usize> },
    Pointers {
        array: PointerArray<A>,
        // Pointees owned by this helper.
        _strings: Vec<CString>,
        _retained: Vec<Value>,
    },
}

/// Marshaled storage for one attribute of family `F`.
///
/// Buffer and pointer-list storage comes from `A`; scalars and handles live
/// in their own cells.
pub struct AttributeValue<F: AttributeFamily, A: RawAllocator = SystemAllocator> {
    attribute: F,
    shape: Shape,
    getter: bool,
    storage: Storage<A>,
}

fn unsupported<F: AttributeFamily>(attribute: impl fmt::Debug) -> MarshalError {
    MarshalError::UnsupportedAttribute {
        family: F::NAME,
        attribute: format!("{attribute:?}"),
    }
}

impl<F: AttributeFamily> AttributeValue<F> {
    pub fn new(attribute: F, init: Option<&Value>, is_getter: bool) -> Result<Self> {
        Self::with_config(attribute, init, is_getter, &MarshalConfig::default())
    }

    pub fn with_config(
        attribute: F,
        init: Option<&Value>,
        is_getter: bool,
        config: &MarshalConfig,
    ) -> Result<Self> {
        Self::with_config_in(attribute, init, is_getter, config, SystemAllocator)
    }

    /// Storage for the driver to write into.
    pub fn getter(attribute: F) -> Result<Self> {
        Self::new(attribute, None, true)
    }

    /// Getter whose buffer-shaped storage holds `capacity` bytes.
    pub fn getter_with_capacity(attribute: F, capacity: usize) -> Result<Self> {
        let strict = MarshalConfig::default().strict_float_narrowing;
        Self::build(attribute, None, true, capacity, strict, SystemAllocator)
    }

    /// Storage holding `value` for the driver to read.
    pub fn setter(attribute: F, value: &Value) -> Result<Self> {
        Self::new(attribute, Some(value), false)
    }

    /// Like [`AttributeValue::new`] with the selector given as its raw enum
    /// value.
    pub fn from_raw(raw: i32, init: Option<&Value>, is_getter: bool) -> Result<Self> {
        let attribute = F::from_raw(raw).ok_or_else(|| unsupported::<F>(raw))?;
        Self::new(attribute, init, is_getter)
    }
}

impl<F: AttributeFamily, A: RawAllocator> AttributeValue<F, A> {
    /// Like [`AttributeValue::with_config`], taking buffer and pointer-list
    /// storage from `alloc`.
    pub fn with_config_in(
        attribute: F,
        init: Option<&Value>,
        is_getter: bool,
        config: &MarshalConfig,
        alloc: A,
    ) -> Result<Self> {
        Self::build(
            attribute,
            init,
            is_getter,
            config.getter_buffer_capacity,
            config.strict_float_narrowing,
            alloc,
        )
    }

    fn build(
        attribute: F,
        init: Option<&Value>,
        getter: bool,
        capacity: usize,
        strict: bool,
        alloc: A,
    ) -> Result<Self> {
        let shape = attribute.shape().ok_or_else(|| unsupported::<F>(attribute))?;
        let storage = if getter {
            getter_storage::<F, A>(attribute, shape, capacity, alloc)?
        } else {
            let value = init.ok_or_else(|| {
                MarshalError::InvalidArgument(format!(
                    "{} {:?} needs a value to set",
                    F::NAME,
                    attribute
                ))
            })?;
            setter_storage(shape, value, strict, alloc)?
        };
        let helper = Self { attribute, shape, getter, storage };
        tracing::debug!(
            family = F::NAME,
            attribute = ?attribute,
            shape = ?shape,
            getter,
            size = helper.size(),
            "attribute storage ready"
        );
        Ok(helper)
    }

    pub fn attribute(&self) -> F {
        self.attribute
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn is_getter(&self) -> bool {
        self.getter
    }

    /// The untyped pointer for the boundary call.
    ///
    /// For by-value families a scalar is returned as the pointer value
    /// itself.
    pub fn address(&self) -> usize {
        match &self.storage {
            Storage::Scalar(cell) => match F::PASSING {
                Passing::ByReference => cell.address(),
                Passing::ByValue => self.scalar().map_or(0, |s| s.to_bits() as usize),
            },
            Storage::Handle(h) => h.address(),
            Storage::Buffer { block, .. } => block.address(),
            Storage::Pointers { array, .. } => array.address(),
        }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.address() as *mut c_void
    }

    /// Size of the value in bytes. For buffer shapes this is the in/out size
    /// the driver may update through [`AttributeValue::size_address`].
    pub fn size(&self) -> usize {
        match &self.storage {
            Storage::Scalar(_) => self
                .shape
                .scalar_type()
                .and_then(|t| t.width())
                .unwrap_or(0),
            Storage::Handle(h) => h.size(),
            Storage::Buffer { size, .. } => size.get(),
            Storage::Pointers { array, .. } => array.len() * size_of::<*mut c_void>(),
        }
    }

    /// Address of the `size_t` size cell, for calls that take `size_t*`.
    pub fn size_address(&self) -> Option<usize> {
        match &self.storage {
            Storage::Buffer { size, .. } => Some(size.address()),
            _ => None,
        }
    }

    /// The whole buffer of buffer-shaped storage, regardless of mode.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Buffer { block, .. } => Some(block.as_slice()),
            _ => None,
        }
    }

    /// The typed value after the driver has written it.
    ///
    /// # Panics
    /// If this helper was built in setter mode.
    pub fn get(&self) -> AttributeData {
        assert!(
            self.getter,
            "get() called on a setter for {} {:?}",
            F::NAME,
            self.attribute
        );
        self.read()
    }

    fn scalar(&self) -> Option<Scalar> {
        match &self.storage {
            Storage::Scalar(cell) => {
                Scalar::read_from(self.shape.scalar_type()?, &cell.get().to_ne_bytes())
            }
            _ => None,
        }
    }

    fn read(&self) -> AttributeData {
        match &self.storage {
            Storage::Scalar(_) => match self.scalar() {
                Some(Scalar::Bool(v)) => AttributeData::Bool(v),
                Some(Scalar::Int(v)) => AttributeData::Int32(v),
                Some(Scalar::UInt(v)) => AttributeData::UInt32(v),
                Some(Scalar::ULongLong(v)) => AttributeData::UInt64(v),
                Some(Scalar::SizeT(v)) => AttributeData::Size(v),
                Some(Scalar::Float(v)) => AttributeData::Float32(v),
                Some(Scalar::Ptr(v)) => AttributeData::Address(v),
                other => unreachable!("scalar shape {:?} read as {:?}", self.shape, other),
            },
            Storage::Handle(HandleStorage::P2pTokens(c)) => AttributeData::P2pTokens(c.get()),
            Storage::Handle(HandleStorage::Fabric(c)) => AttributeData::FabricHandle(c.get()),
            Storage::Buffer { block, size } => {
                let data = &block.as_slice()[..size.get().min(block.len())];
                match self.shape {
                    Shape::CString => {
                        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                        AttributeData::Text(String::from_utf8_lossy(&data[..end]).into_owned())
                    }
                    Shape::Int32Array => AttributeData::Int32List(
                        data.chunks_exact(4)
                            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                            .collect(),
                    ),
                    _ => AttributeData::Bytes(data.to_vec()),
                }
            }
            Storage::Pointers { array, .. } => AttributeData::Addresses(array.entries().to_vec()),
        }
    }
}

fn getter_storage<F: AttributeFamily, A: RawAllocator>(
    attribute: F,
    shape: Shape,
    capacity: usize,
    alloc: A,
) -> Result<Storage<A>> {
    match shape {
        Shape::Handle(kind) => Ok(Storage::Handle(HandleStorage::zeroed(kind))),
        Shape::CString | Shape::Bytes | Shape::Int32Array => {
            if shape == Shape::Int32Array && capacity % 4 != 0 {
                return Err(MarshalError::InvalidArgument(format!(
                    "{} {:?} needs a size that is a multiple of 4, got {}",
                    F::NAME,
                    attribute,
                    capacity
                )));
            }
            Ok(Storage::Buffer {
                block: RawBlock::allocate_in(capacity, 1, alloc)?,
                size: NativeCell::new(capacity),
            })
        }
        Shape::AddressList | Shape::StringList => Err(MarshalError::InvalidArgument(format!(
            "{} {:?} can only be set",
            F::NAME,
            attribute
        ))),
        _ if F::PASSING == Passing::ByValue => Err(MarshalError::InvalidArgument(format!(
            "{} {:?} is passed by value and cannot be read back",
            F::NAME,
            attribute
        ))),
        _ => Ok(Storage::Scalar(NativeCell::zeroed())),
    }
}

fn buffer_from<A: RawAllocator>(data: &[u8], alloc: A) -> Result<Storage<A>> {
    let mut block = RawBlock::allocate_in(data.len(), 1, alloc)?;
    block.as_mut_slice().copy_from_slice(data);
    Ok(Storage::Buffer { block, size: NativeCell::new(data.len()) })
}

fn c_string(value: &Value, expected: &str) -> Result<CString> {
    let bytes = match value {
        Value::Str(s) => s.as_bytes().to_vec(),
        Value::Bytes(b) => b.clone(),
        other => return Err(MarshalError::mismatch(expected, other)),
    };
    CString::new(bytes)
        .map_err(|e| MarshalError::InvalidArgument(format!("string has an interior NUL at {}", e.nul_position())))
}

fn setter_storage<A: RawAllocator>(
    shape: Shape,
    value: &Value,
    strict: bool,
    alloc: A,
) -> Result<Storage<A>> {
    if let Some(ty) = shape.scalar_type() {
        let scalar = Scalar::coerce(ty, value, strict)?;
        let mut buf = [0u8; 8];
        scalar.write_to(&mut buf[..scalar.width()]);
        return Ok(Storage::Scalar(NativeCell::new(u64::from_ne_bytes(buf))));
    }

    match shape {
        Shape::Handle(kind) => {
            let expected = match kind {
                HandleKind::P2pTokens => "P2pTokens",
                HandleKind::Fabric => "FabricHandle",
            };
            let bytes = match value {
                Value::Struct(s) if s.type_name() == expected => s.as_bytes(),
                other => return Err(MarshalError::mismatch(expected, other)),
            };
            let handle = match kind {
                HandleKind::P2pTokens => bytemuck::try_pod_read_unaligned::<P2pTokens>(bytes)
                    .map(|v| HandleStorage::P2pTokens(NativeCell::new(v))),
                HandleKind::Fabric => bytemuck::try_pod_read_unaligned::<FabricHandle>(bytes)
                    .map(|v| HandleStorage::Fabric(NativeCell::new(v))),
            }
            .map_err(|_| {
                MarshalError::InvalidArgument(format!(
                    "{expected} expects {} bytes, got {}",
                    match kind {
                        HandleKind::P2pTokens => size_of::<P2pTokens>(),
                        HandleKind::Fabric => size_of::<FabricHandle>(),
                    },
                    bytes.len()
                ))
            })?;
            Ok(Storage::Handle(handle))
        }
        Shape::CString => buffer_from(c_string(value, "str or bytes")?.as_bytes_with_nul(), alloc),
        Shape::Bytes => match value {
            Value::Bytes(b) => buffer_from(b, alloc),
            Value::Int(n) => {
                let n = usize::try_from(*n).map_err(|_| MarshalError::OutOfRange {
                    value: n.to_string(),
                    target: "buffer size".into(),
                })?;
                Ok(Storage::Buffer {
                    block: RawBlock::allocate_in(n, 1, alloc)?,
                    size: NativeCell::new(n),
                })
            }
            other => Err(MarshalError::mismatch("bytes or a buffer size", other)),
        },
        Shape::Int32Array => match value {
            Value::List(items) => {
                let mut data = Vec::with_capacity(items.len() * 4);
                for item in items {
                    match Scalar::coerce(ParamType::Int, item, strict)? {
                        Scalar::Int(v) => data.extend_from_slice(&v.to_ne_bytes()),
                        other => unreachable!("int coercion produced {other:?}"),
                    }
                }
                buffer_from(&data, alloc)
            }
            other => Err(MarshalError::mismatch("a list of int", other)),
        },
        Shape::AddressList => match value {
            Value::List(items) => {
                let mut addresses = Vec::with_capacity(items.len());
                let mut retained = Vec::new();
                for item in items {
                    match Scalar::coerce(ParamType::VoidPtr, item, strict)? {
                        Scalar::Ptr(address) => addresses.push(address),
                        other => unreachable!("pointer coercion produced {other:?}"),
                    }
                    if matches!(item, Value::Pointer(_)) {
                        retained.push(item.clone());
                    }
                }
                Ok(Storage::Pointers {
                    array: PointerArray::from_addresses_in(addresses, alloc)?,
                    _strings: Vec::new(),
                    _retained: retained,
                })
            }
            other => Err(MarshalError::mismatch("a list of addresses", other)),
        },
        Shape::StringList => match value {
            Value::List(items) => {
                let strings = items
                    .iter()
                    .map(|item| c_string(item, "a list of str"))
                    .collect::<Result<Vec<_>>>()?;
                let array = PointerArray::from_addresses_in(
                    strings.iter().map(|s| s.as_ptr() as usize).collect::<Vec<_>>(),
                    alloc,
                )?;
                Ok(Storage::Pointers { array, _strings: strings, _retained: Vec::new() })
            }
            other => Err(MarshalError::mismatch("a list of str", other)),
        },
        scalar => unreachable!("scalar shape {scalar:?} handled above"),
    }
}

impl<F: AttributeFamily, A: RawAllocator + Send + Sync> RawAddress for AttributeValue<F, A> {
    fn raw_address(&self) -> usize {
        self.address()
    }

    fn type_name(&self) -> &str {
        F::NAME
    }
}

impl<F: AttributeFamily, A: RawAllocator> fmt::Debug for AttributeValue<F, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeValue")
            .field("family", &F::NAME)
            .field("attribute", &self.attribute)
            .field("shape", &self.shape)
            .field("getter", &self.getter)
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}
