//! Conversion of Python objects into marshaling values.

use std::sync::Arc;

use cuarg_core::{
    BufferSource, EnumValue, ErrorKind, ForeignAddress, MarshalError, NativeStruct, ParamType,
    RawView, Value,
};
use parking_lot::Mutex;
use pyo3::exceptions::{PyMemoryError, PyTypeError, PyValueError};
use pyo3::ffi;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyBytes, PyFloat, PyInt, PyList, PyString, PyTuple, PyType};

/// Map a marshaling error to the matching Python exception class.
pub fn to_py_err(e: MarshalError) -> PyErr {
    match e.kind() {
        ErrorKind::Type => PyTypeError::new_err(e.to_string()),
        ErrorKind::InvalidArgument => PyValueError::new_err(e.to_string()),
        ErrorKind::OutOfMemory => PyMemoryError::new_err(e.to_string()),
    }
}

fn class_name(obj: &Bound<'_, PyAny>) -> String {
    obj.get_type()
        .name()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| "object".to_string())
}

// === Buffer protocol ===

struct HeldView(Box<ffi::Py_buffer>);

// The view is only touched while holding the GIL.
unsafe impl Send for HeldView {}

/// A Python object exporting the buffer protocol.
pub struct PyBufferSource {
    object: Py<PyAny>,
    type_name: String,
    held: Mutex<Vec<HeldView>>,
}

impl PyBufferSource {
    pub fn new(object: &Bound<'_, PyAny>) -> Self {
        Self {
            object: object.clone().unbind(),
            type_name: class_name(object),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn supports(object: &Bound<'_, PyAny>) -> bool {
        unsafe { ffi::PyObject_CheckBuffer(object.as_ptr()) != 0 }
    }
}

impl BufferSource for PyBufferSource {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn acquire(&self) -> cuarg_core::Result<RawView> {
        Python::with_gil(|py| {
            let mut view = Box::new(ffi::Py_buffer::new());
            let rc = unsafe {
                ffi::PyObject_GetBuffer(self.object.as_ptr(), &mut *view, ffi::PyBUF_SIMPLE)
            };
            if rc != 0 {
                let err = PyErr::fetch(py);
                tracing::debug!(source = %self.type_name, error = %err, "buffer request refused");
                return Err(MarshalError::NotABuffer(self.type_name.clone()));
            }
            let raw = RawView { address: view.buf as usize, len: view.len as usize };
            self.held.lock().push(HeldView(view));
            Ok(raw)
        })
    }

    fn release(&self, view: RawView) {
        let mut held = self.held.lock();
        let Some(idx) = held.iter().position(|h| h.0.buf as usize == view.address) else {
            tracing::warn!(source = %self.type_name, address = view.address, "release of unknown view");
            return;
        };
        let mut entry = held.swap_remove(idx);
        drop(held);
        Python::with_gil(|_py| unsafe { ffi::PyBuffer_Release(&mut *entry.0) });
    }
}

// === Native structures ===

/// Bytes copied out of a `ctypes.Structure`.
struct CopiedStruct {
    type_name: String,
    bytes: Vec<u8>,
}

impl NativeStruct for CopiedStruct {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Driver struct names map onto the handle types they mirror.
fn native_struct_name(class: &str) -> String {
    let lower = class.to_ascii_lowercase();
    if lower.contains("fabrichandle") {
        "FabricHandle".into()
    } else if lower.contains("p2p_tokens") || lower.contains("p2ptokens") {
        "P2pTokens".into()
    } else {
        class.to_string()
    }
}

fn is_instance_of(obj: &Bound<'_, PyAny>, module: &str, class: &str) -> PyResult<bool> {
    let py = obj.py();
    let ty = py.import_bound(module)?.getattr(class)?;
    obj.is_instance(&ty)
}

/// `bytes(obj)`, for ctypes instances.
fn object_bytes(obj: &Bound<'_, PyAny>) -> PyResult<Vec<u8>> {
    obj.py().get_type_bound::<PyBytes>().call1((obj,))?.extract()
}

/// numpy is optional: without it nothing is a numpy scalar.
fn is_numpy_scalar(obj: &Bound<'_, PyAny>) -> bool {
    is_instance_of(obj, "numpy", "generic").unwrap_or(false)
}

// === Values ===

/// Convert an arbitrary Python object into a [`Value`].
pub fn to_value(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::None);
    }
    if obj.is_instance_of::<PyBool>() {
        return Ok(Value::Bool(obj.extract()?));
    }
    // Before int: IntEnum members are ints too.
    if is_instance_of(obj, "enum", "Enum")? {
        let ordinal: i64 = obj.getattr("value")?.extract()?;
        return Ok(Value::Enum(EnumValue::new(class_name(obj), ordinal)));
    }
    if obj.is_instance_of::<PyInt>() {
        return Ok(Value::Int(obj.extract()?));
    }
    if obj.is_instance_of::<PyFloat>() {
        return Ok(Value::Float(obj.extract()?));
    }
    if let Ok(b) = obj.downcast::<PyBytes>() {
        return Ok(Value::Bytes(b.as_bytes().to_vec()));
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(Value::Str(s.to_str()?.to_owned()));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return list.iter().map(|item| to_value(&item)).collect::<PyResult<_>>().map(Value::List);
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return tuple.iter().map(|item| to_value(&item)).collect::<PyResult<_>>().map(Value::List);
    }
    if obj.hasattr("getPtr")? {
        let address: usize = obj.call_method0("getPtr")?.extract()?;
        return Ok(Value::pointer(ForeignAddress::new(class_name(obj), address)));
    }
    if is_instance_of(obj, "ctypes", "Structure")? {
        return Ok(Value::native(CopiedStruct {
            type_name: native_struct_name(&class_name(obj)),
            bytes: object_bytes(obj)?,
        }));
    }
    // Exact-width scalars such as `ctypes.c_uint(42)` or `numpy.float32(2.5)`
    // are copied byte for byte into their slot.
    if is_instance_of(obj, "ctypes", "_SimpleCData")? {
        return Ok(Value::native(CopiedStruct {
            type_name: class_name(obj),
            bytes: object_bytes(obj)?,
        }));
    }
    if is_numpy_scalar(obj) {
        return Ok(Value::native(CopiedStruct {
            type_name: class_name(obj),
            bytes: obj.call_method0("tobytes")?.extract()?,
        }));
    }
    if PyBufferSource::supports(obj) {
        return Ok(Value::Buffer(Arc::new(PyBufferSource::new(obj))));
    }
    Err(PyTypeError::new_err(format!("Unsupported type: {}", class_name(obj))))
}

/// Parse a type tag given as `None`, a type name, or a type object such as
/// `ctypes.c_int`.
pub fn to_param_type(tag: &Bound<'_, PyAny>) -> PyResult<ParamType> {
    if tag.is_none() {
        return Ok(ParamType::None);
    }
    let name = if let Ok(ty) = tag.downcast::<PyType>() {
        ty.name()?.to_string()
    } else if let Ok(s) = tag.downcast::<PyString>() {
        s.to_str()?.to_owned()
    } else {
        return Err(PyTypeError::new_err(format!("Unsupported type: {}", class_name(tag))));
    };
    ParamType::from_name(&name).map_err(to_py_err)
}

/// The raw address a helper object exposes: `cptr`, `getPtr()`, or an int.
pub fn to_address(obj: &Bound<'_, PyAny>) -> PyResult<usize> {
    if let Ok(address) = obj.extract::<usize>() {
        return Ok(address);
    }
    if obj.hasattr("cptr")? {
        return obj.getattr("cptr")?.extract();
    }
    if obj.hasattr("getPtr")? {
        return obj.call_method0("getPtr")?.extract();
    }
    Err(PyTypeError::new_err(format!(
        "Expected an object exposing an address, found {}",
        class_name(obj)
    )))
}
