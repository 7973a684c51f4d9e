//! Kernel parameter packing.
//!
//! Builds the `void**` array a kernel launch expects: entry i points at the
//! raw bytes of argument i. Scalars are copied into an owned arena at their
//! exact width; pointer-capable and structured values are pointed at in
//! place and kept alive for as long as the packer lives.

use std::ffi::c_void;
use std::mem::size_of;
use std::sync::Arc;

use crate::alloc::{RawAllocator, RawBlock, SystemAllocator};
use crate::arena::{Arena, SlotRef};
use crate::buffer::{BufferGuard, BufferSource};
use crate::config::MarshalConfig;
use crate::param_type::ParamType;
use crate::scalar::Scalar;
use crate::value::Value;
use crate::{MarshalError, Result};

/// The accepted input shapes for [`KernelParams`].
pub enum KernelArgs {
    /// No arguments: the packed address is null.
    None,
    /// A caller-owned `void**`, passed through untouched.
    Address(usize),
    /// An object lending its memory as the argument array.
    Buffer(Arc<dyn BufferSource>),
    /// Values with one native type tag each.
    Packed { values: Vec<Value>, types: Vec<ParamType> },
}

impl KernelArgs {
    pub fn packed(values: Vec<Value>, types: Vec<ParamType>) -> Self {
        KernelArgs::Packed { values, types }
    }

    /// Interpret a dynamic value: `None`, an integer address, a buffer, or a
    /// two-element list of `(values, types)` where types are names or `None`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::None => Ok(KernelArgs::None),
            Value::Int(i) => usize::try_from(i)
                .map(KernelArgs::Address)
                .map_err(|_| MarshalError::OutOfRange {
                    value: i.to_string(),
                    target: "kernel parameter address".into(),
                }),
            Value::Buffer(source) => Ok(KernelArgs::Buffer(source)),
            Value::List(mut pair) if pair.len() == 2 => {
                let types = pair.pop();
                let values = pair.pop();
                match (values, types) {
                    (Some(Value::List(values)), Some(Value::List(types))) => {
                        let types = types
                            .iter()
                            .map(type_from_value)
                            .collect::<Result<Vec<_>>>()?;
                        Ok(KernelArgs::Packed { values, types })
                    }
                    (Some(values), _) => Err(MarshalError::mismatch("a sequence of values", &values)),
                    _ => Err(MarshalError::InvalidArgument("empty argument pair".into())),
                }
            }
            other => Err(MarshalError::mismatch(
                "None, an address, a buffer or a (values, types) pair",
                &other,
            )),
        }
    }
}

fn type_from_value(tag: &Value) -> Result<ParamType> {
    match tag {
        Value::None => Ok(ParamType::None),
        Value::Str(name) => ParamType::from_name(name),
        other => Err(MarshalError::UnsupportedType(other.type_name())),
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Points into memory owned by the argument value.
    Foreign(usize),
    /// Points into the arena.
    Owned(SlotRef, ParamType),
}

struct Packed<A: RawAllocator> {
    pointers: RawBlock<A>,
    arena: Arena<A>,
    slots: Vec<Slot>,
    // Values whose memory the slot array points into.
    _retained: Vec<Value>,
}

enum Mode<A: RawAllocator> {
    Empty,
    PassThrough(usize),
    Borrowed(BufferGuard),
    Owned(Packed<A>),
    Released,
}

/// A packed kernel argument array.
///
/// Fully built on construction; [`KernelParams::address`] is the value to
/// hand to the launch call. Storage is freed once, on [`KernelParams::release`]
/// or drop, and never in pass-through mode.
pub struct KernelParams<A: RawAllocator = SystemAllocator> {
    mode: Mode<A>,
}

impl KernelParams {
    pub fn new(args: KernelArgs) -> Result<Self> {
        Self::new_in(args, SystemAllocator)
    }
}

impl<A: RawAllocator + Clone> KernelParams<A> {
    pub fn new_in(args: KernelArgs, alloc: A) -> Result<Self> {
        Self::with_config_in(args, &MarshalConfig::default(), alloc)
    }

    pub fn with_config_in(args: KernelArgs, config: &MarshalConfig, alloc: A) -> Result<Self> {
        let mode = match args {
            KernelArgs::None => Mode::Empty,
            KernelArgs::Address(address) => Mode::PassThrough(address),
            KernelArgs::Buffer(source) => Mode::Borrowed(BufferGuard::acquire(source)?),
            KernelArgs::Packed { values, types } => pack(values, types, config, alloc)?,
        };
        let params = Self { mode };
        tracing::debug!(
            mode = params.mode_name(),
            slots = params.len(),
            backing_bytes = params.backing_used(),
            "kernel parameters ready"
        );
        Ok(params)
    }
}

fn pack<A: RawAllocator + Clone>(
    values: Vec<Value>,
    types: Vec<ParamType>,
    config: &MarshalConfig,
    alloc: A,
) -> Result<Mode<A>> {
    if values.len() != types.len() {
        return Err(MarshalError::LengthMismatch {
            values: values.len(),
            types: types.len(),
        });
    }
    let n = values.len();
    if n == 0 {
        return Ok(Mode::Empty);
    }

    let mut pointers = RawBlock::allocate_in(n, size_of::<*mut c_void>(), alloc.clone())?;
    let mut arena = Arena::for_slots(n, alloc)?;
    let mut slots = Vec::with_capacity(n);
    let mut retained = Vec::new();

    for (i, (value, &ty)) in values.iter().zip(&types).enumerate() {
        let slot = pack_one(&mut arena, value, ty, config.strict_float_narrowing).map_err(|e| {
            tracing::debug!(index = i, ty = %ty, error = %e, "failed to pack kernel argument");
            e
        })?;
        tracing::trace!(index = i, ty = %ty, slot = ?slot, "packed kernel argument");
        if matches!(value, Value::Pointer(_) | Value::Struct(_)) {
            retained.push(value.clone());
        }
        slots.push(slot);
    }

    let table: &mut [usize] = bytemuck::cast_slice_mut(pointers.as_mut_slice());
    for (entry, slot) in table.iter_mut().zip(&slots) {
        *entry = match *slot {
            Slot::Foreign(address) => address,
            Slot::Owned(slot, _) => arena.address_of(slot),
        };
    }

    Ok(Mode::Owned(Packed { pointers, arena, slots, _retained: retained }))
}

fn pack_one<A: RawAllocator>(
    arena: &mut Arena<A>,
    value: &Value,
    ty: ParamType,
    strict: bool,
) -> Result<Slot> {
    let scalar = match ty {
        ParamType::None => match value {
            Value::Pointer(p) => return Ok(Slot::Foreign(p.raw_address())),
            Value::Struct(s) => return Ok(Slot::Foreign(s.address())),
            Value::Enum(_) => Scalar::coerce(ParamType::Int, value, strict)?,
            other => {
                return Err(MarshalError::mismatch(
                    "a pointer object, native structure or enum for an untyped argument",
                    other,
                ))
            }
        },
        ty => Scalar::coerce(ty, value, strict)?,
    };
    let slot = arena
        .reserve(scalar.width())
        .ok_or_else(|| MarshalError::InvalidArgument("kernel argument storage exhausted".into()))?;
    scalar.write_to(arena.slot_mut(slot));
    Ok(Slot::Owned(slot, scalar.param_type()))
}

impl<A: RawAllocator> KernelParams<A> {
    /// Address of the `void**` array, 0 when empty or released.
    pub fn address(&self) -> usize {
        match &self.mode {
            Mode::Empty | Mode::Released => 0,
            Mode::PassThrough(address) => *address,
            Mode::Borrowed(guard) => guard.address(),
            Mode::Owned(packed) => packed.pointers.address(),
        }
    }

    pub fn as_ptr(&self) -> *mut *mut c_void {
        self.address() as *mut *mut c_void
    }

    /// Number of packed slots. Zero unless this packer owns its storage.
    pub fn len(&self) -> usize {
        match &self.mode {
            Mode::Owned(packed) => packed.slots.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self.mode, Mode::PassThrough(_))
    }

    pub fn owns_storage(&self) -> bool {
        matches!(self.mode, Mode::Owned(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.mode, Mode::Released)
    }

    /// Bytes written to the backing arena.
    pub fn backing_used(&self) -> usize {
        match &self.mode {
            Mode::Owned(packed) => packed.arena.used(),
            _ => 0,
        }
    }

    /// Entry `index` of the pointer array.
    pub fn slot_address(&self, index: usize) -> Option<usize> {
        match &self.mode {
            Mode::Owned(packed) => {
                let table: &[usize] = bytemuck::cast_slice(packed.pointers.as_slice());
                table.get(index).copied()
            }
            _ => None,
        }
    }

    /// The owned bytes behind slot `index`; `None` for slots pointing into
    /// caller memory.
    pub fn slot_bytes(&self, index: usize) -> Option<&[u8]> {
        match &self.mode {
            Mode::Owned(packed) => match packed.slots.get(index)? {
                Slot::Owned(slot, _) => Some(packed.arena.slot(*slot)),
                Slot::Foreign(_) => None,
            },
            _ => None,
        }
    }

    /// The scalar written into slot `index`, read back at its own width.
    pub fn slot_value(&self, index: usize) -> Option<Scalar> {
        match &self.mode {
            Mode::Owned(packed) => match packed.slots.get(index)? {
                Slot::Owned(slot, ty) => Scalar::read_from(*ty, packed.arena.slot(*slot)),
                Slot::Foreign(_) => None,
            },
            _ => None,
        }
    }

    /// Reinterpret the memory slot `index` points at as `ty`.
    ///
    /// # Safety
    /// For slots pointing into caller memory, that memory must hold at
    /// least `ty`'s width of readable bytes.
    pub unsafe fn read_slot(&self, index: usize, ty: ParamType) -> Option<Scalar> {
        let address = self.slot_address(index)?;
        let width = ty.width()?;
        let bytes = std::slice::from_raw_parts(address as *const u8, width);
        Scalar::read_from(ty, bytes)
    }

    /// Free owned storage and release any borrowed view. Later calls do
    /// nothing.
    pub fn release(&mut self) {
        match std::mem::replace(&mut self.mode, Mode::Released) {
            Mode::Borrowed(mut guard) => guard.release(),
            Mode::Owned(packed) => {
                tracing::trace!(slots = packed.slots.len(), "freeing kernel parameter storage");
                drop(packed);
            }
            Mode::Empty | Mode::PassThrough(_) | Mode::Released => {}
        }
    }

    fn mode_name(&self) -> &'static str {
        match self.mode {
            Mode::Empty => "empty",
            Mode::PassThrough(_) => "pass-through",
            Mode::Borrowed(_) => "borrowed",
            Mode::Owned(_) => "owned",
            Mode::Released => "released",
        }
    }
}

impl<A: RawAllocator> Drop for KernelParams<A> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<A: RawAllocator> std::fmt::Debug for KernelParams<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelParams")
            .field("mode", &self.mode_name())
            .field("address", &format_args!("{:#x}", self.address()))
            .field("slots", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DevicePtr, EnumValue, RawAddress};

    #[test]
    fn test_absent_input_is_null() {
        let p = KernelParams::new(KernelArgs::None).unwrap();
        assert_eq!(p.address(), 0);
        assert!(p.as_ptr().is_null());
    }

    #[test]
    fn test_pass_through() {
        let p = KernelParams::new(KernelArgs::Address(0x7000)).unwrap();
        assert_eq!(p.address(), 0x7000);
        assert!(p.is_pass_through());
        assert!(!p.owns_storage());
    }

    #[test]
    fn test_mixed_widths_share_backing() {
        let p = KernelParams::new(KernelArgs::packed(
            vec![Value::from(true), Value::from(-3i32), Value::from(2.5f64), Value::from(7u16)],
            vec![ParamType::Bool, ParamType::Int, ParamType::Double, ParamType::UShort],
        ))
        .unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(p.backing_used(), 1 + 4 + 8 + 2);
        let base = p.slot_address(0).unwrap();
        assert_eq!(p.slot_address(1), Some(base + 1));
        assert_eq!(p.slot_address(2), Some(base + 5));
        assert_eq!(p.slot_address(3), Some(base + 13));
        assert_eq!(p.slot_value(1), Some(Scalar::Int(-3)));
        assert_eq!(p.slot_value(2), Some(Scalar::Double(2.5)));
    }

    #[test]
    fn test_untyped_enum_is_int_ordinal() {
        let p = KernelParams::new(KernelArgs::packed(
            vec![Value::Enum(EnumValue::new("CUmemorytype", 2))],
            vec![ParamType::None],
        ))
        .unwrap();
        assert_eq!(p.slot_bytes(0), Some(&2i32.to_ne_bytes()[..]));
    }

    #[test]
    fn test_untyped_pointer_object_points_in_place() {
        let ptr = DevicePtr::new(0xabc0);
        let cell = ptr.raw_address();
        let p = KernelParams::new(KernelArgs::packed(
            vec![Value::pointer(ptr)],
            vec![ParamType::None],
        ))
        .unwrap();
        assert_eq!(p.slot_address(0), Some(cell));
        assert_eq!(p.backing_used(), 0);
        assert_eq!(
            unsafe { p.read_slot(0, ParamType::ULongLong) },
            Some(Scalar::ULongLong(0xabc0))
        );
    }

    #[test]
    fn test_untyped_plain_int_rejected() {
        let err = KernelParams::new(KernelArgs::packed(vec![Value::from(1u8)], vec![ParamType::None]))
            .unwrap_err();
        assert!(matches!(err, MarshalError::TypeMismatch { ref actual, .. } if actual == "int"));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut p = KernelParams::new(KernelArgs::packed(
            vec![Value::from(1u32)],
            vec![ParamType::UInt],
        ))
        .unwrap();
        p.release();
        p.release();
        assert!(p.is_released());
        assert_eq!(p.address(), 0);
        assert_eq!(p.slot_address(0), None);
    }

    #[test]
    fn test_from_value() {
        let args = KernelArgs::from_value(Value::List(vec![
            Value::List(vec![Value::from(1u32), Value::from(2.0f32)]),
            Value::List(vec![Value::from("c_uint"), Value::from("c_float")]),
        ]))
        .unwrap();
        let p = KernelParams::new(args).unwrap();
        assert_eq!(p.slot_value(1), Some(Scalar::Float(2.0)));

        assert!(matches!(KernelArgs::from_value(Value::None).unwrap(), KernelArgs::None));
        assert!(matches!(
            KernelArgs::from_value(Value::from(0x10u32)).unwrap(),
            KernelArgs::Address(0x10)
        ));
        assert!(KernelArgs::from_value(Value::from("nope")).is_err());
    }

    #[test]
    fn test_from_value_unsupported_tag() {
        let err = KernelArgs::from_value(Value::List(vec![
            Value::List(vec![Value::from(1u32)]),
            Value::List(vec![Value::from("c_wchar")]),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, MarshalError::UnsupportedType(ref t) if t == "c_wchar"));
    }
}
