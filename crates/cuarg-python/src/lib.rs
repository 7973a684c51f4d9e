//! # cuarg-python
//!
//! PyO3 bindings for cuarg → `import cuarg` in Python.
//!
//! Provides:
//! - `cuarg.KernelParams`: packs kernel arguments into a `void**`
//! - `cuarg.*AttributeHelper` / `cuarg.*Helper`: attribute getters and setters
//! - `cuarg.VoidPtrArray`: `void**` built from helper objects

mod convert;

use cuarg_core::attr::{
    CoredumpSetting, GraphMemAttribute, JitOption, MemAllocationHandleType, MemPoolAttribute,
    MemRangeAttribute, PointerAttribute,
};
use cuarg_core::{AttributeData, AttributeValue, KernelArgs, PointerArray};
use pyo3::exceptions::PyTypeError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyList, PyTuple};

use convert::{to_address, to_param_type, to_py_err, to_value, PyBufferSource};

// ============================================================================
// Kernel parameters
// ============================================================================

fn to_kernel_args(args: &Bound<'_, PyAny>) -> PyResult<KernelArgs> {
    if args.is_none() {
        return Ok(KernelArgs::None);
    }
    if let Ok(address) = args.extract::<usize>() {
        return Ok(KernelArgs::Address(address));
    }
    let pair = args
        .downcast::<PyTuple>()
        .map(|t| t.iter().collect::<Vec<_>>())
        .or_else(|_| args.downcast::<PyList>().map(|l| l.iter().collect::<Vec<_>>()));
    if let Ok(pair) = pair {
        let [values, types] = pair.as_slice() else {
            return Err(PyTypeError::new_err(
                "Kernel arguments must be a (values, types) pair",
            ));
        };
        let values = values
            .iter()?
            .map(|v| to_value(&v?))
            .collect::<PyResult<Vec<_>>>()?;
        let types = types
            .iter()?
            .map(|t| to_param_type(&t?))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(KernelArgs::packed(values, types));
    }
    if PyBufferSource::supports(args) {
        return Ok(KernelArgs::Buffer(std::sync::Arc::new(PyBufferSource::new(args))));
    }
    Err(PyTypeError::new_err(format!(
        "Argument type {} is not supported",
        args.get_type().name()?
    )))
}

/// `void**` kernel parameters for a launch call.
#[pyclass(name = "KernelParams")]
struct PyKernelParams {
    inner: cuarg_core::KernelParams,
    // Keeps pointer objects and buffers alive while the table refers to them.
    _args: PyObject,
}

#[pymethods]
impl PyKernelParams {
    #[new]
    fn new(args: &Bound<'_, PyAny>) -> PyResult<Self> {
        let inner = cuarg_core::KernelParams::new(to_kernel_args(args)?).map_err(to_py_err)?;
        Ok(Self { inner, _args: args.clone().unbind() })
    }

    /// Address of the parameter table, 0 when there is none.
    #[getter]
    fn ptr(&self) -> usize {
        self.inner.address()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    /// Free owned storage or release a borrowed buffer now.
    fn release(&mut self) {
        self.inner.release();
    }
}

// ============================================================================
// Attribute helpers
// ============================================================================

fn data_to_py(py: Python<'_>, data: AttributeData) -> PyObject {
    match data {
        AttributeData::Bool(v) => v.into_py(py),
        AttributeData::Int32(v) => v.into_py(py),
        AttributeData::UInt32(v) => v.into_py(py),
        AttributeData::UInt64(v) => v.into_py(py),
        AttributeData::Size(v) => v.into_py(py),
        AttributeData::Float32(v) => v.into_py(py),
        AttributeData::Address(v) => v.into_py(py),
        AttributeData::P2pTokens(t) => (t.p2p_token, t.va_space_token).into_py(py),
        AttributeData::FabricHandle(h) => PyBytes::new_bound(py, &h.data).into_py(py),
        AttributeData::Text(s) => s.into_py(py),
        AttributeData::Bytes(b) => PyBytes::new_bound(py, &b).into_py(py),
        AttributeData::Int32List(v) => v.into_py(py),
        AttributeData::Addresses(v) => v.into_py(py),
    }
}

/// Attribute selectors arrive as ints or `enum.IntEnum` members.
fn selector(attr: &Bound<'_, PyAny>) -> PyResult<i32> {
    if let Ok(raw) = attr.extract::<i32>() {
        return Ok(raw);
    }
    attr.getattr("value")?.extract()
}

macro_rules! attribute_helper {
    ($py_name:literal, $rust_name:ident, $family:ty) => {
        #[pyclass(name = $py_name)]
        struct $rust_name {
            inner: AttributeValue<$family>,
            _init: Option<PyObject>,
        }

        #[pymethods]
        impl $rust_name {
            #[new]
            #[pyo3(signature = (attr, init=None, is_getter=false))]
            fn new(
                attr: &Bound<'_, PyAny>,
                init: Option<&Bound<'_, PyAny>>,
                is_getter: bool,
            ) -> PyResult<Self> {
                let value = match init {
                    Some(obj) if !is_getter => Some(to_value(obj)?),
                    _ => None,
                };
                let inner = AttributeValue::<$family>::from_raw(selector(attr)?, value.as_ref(), is_getter)
                    .map_err(to_py_err)?;
                Ok(Self { inner, _init: init.map(|o| o.clone().unbind()) })
            }

            /// Address for the driver call.
            #[getter]
            fn cptr(&self) -> usize {
                self.inner.address()
            }

            #[getter]
            fn size(&self) -> usize {
                self.inner.size()
            }

            /// Address of the in/out size for buffer-shaped values.
            #[getter]
            fn size_ptr(&self) -> Option<usize> {
                self.inner.size_address()
            }

            /// The value the driver wrote, as a Python object.
            #[pyo3(name = "pyObj")]
            fn py_obj(&self, py: Python<'_>) -> PyResult<PyObject> {
                if !self.inner.is_getter() {
                    return Err(pyo3::exceptions::PyRuntimeError::new_err(
                        "pyObj() is only available on getters",
                    ));
                }
                Ok(data_to_py(py, self.inner.get()))
            }
        }
    };
}

attribute_helper!("PointerAttributeHelper", PyPointerAttributeHelper, PointerAttribute);
attribute_helper!("MemPoolAttributeHelper", PyMemPoolAttributeHelper, MemPoolAttribute);
attribute_helper!("GraphMemAttributeHelper", PyGraphMemAttributeHelper, GraphMemAttribute);
attribute_helper!("MemRangeAttributeHelper", PyMemRangeAttributeHelper, MemRangeAttribute);
attribute_helper!("MemAllocationHandleHelper", PyMemAllocationHandleHelper, MemAllocationHandleType);
attribute_helper!("CoredumpSettingHelper", PyCoredumpSettingHelper, CoredumpSetting);
attribute_helper!("JitOptionHelper", PyJitOptionHelper, JitOption);

// ============================================================================
// Pointer arrays
// ============================================================================

/// `void**` holding the addresses of helper objects.
#[pyclass(name = "VoidPtrArray")]
struct PyVoidPtrArray {
    inner: PointerArray,
    _helpers: PyObject,
}

#[pymethods]
impl PyVoidPtrArray {
    #[new]
    fn new(helpers: &Bound<'_, PyAny>) -> PyResult<Self> {
        let addresses = helpers
            .iter()?
            .map(|h| to_address(&h?))
            .collect::<PyResult<Vec<_>>>()?;
        let inner = PointerArray::from_addresses(addresses).map_err(to_py_err)?;
        Ok(Self { inner, _helpers: helpers.clone().unbind() })
    }

    #[getter]
    fn ptr(&self) -> usize {
        self.inner.address()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}

// ============================================================================
// Module entry point
// ============================================================================

#[pymodule]
fn cuarg(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyKernelParams>()?;
    m.add_class::<PyPointerAttributeHelper>()?;
    m.add_class::<PyMemPoolAttributeHelper>()?;
    m.add_class::<PyGraphMemAttributeHelper>()?;
    m.add_class::<PyMemRangeAttributeHelper>()?;
    m.add_class::<PyMemAllocationHandleHelper>()?;
    m.add_class::<PyCoredumpSettingHelper>()?;
    m.add_class::<PyJitOptionHelper>()?;
    m.add_class::<PyVoidPtrArray>()?;
    Ok(())
}
