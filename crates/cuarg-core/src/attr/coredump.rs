//! `CUcoredumpSettings`.

use super::Shape;

attribute_family! {
    /// Context and process-wide GPU coredump settings.
    pub enum CoredumpSetting("coredump setting", ByReference) {
        EnableOnException = 1 => Some(Shape::Bool),
        TriggerHost = 2 => Some(Shape::Bool),
        Lightweight = 3 => Some(Shape::Bool),
        EnableUserTrigger = 4 => Some(Shape::Bool),
        File = 5 => Some(Shape::CString),
        Pipe = 6 => Some(Shape::CString),
        GenerationFlags = 7 => Some(Shape::UInt32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{AttributeData, AttributeValue};
    use crate::config::{MarshalConfig, DEFAULT_GETTER_CAPACITY};
    use crate::error::ErrorKind;
    use crate::value::Value;

    #[test]
    fn test_file_getter_uses_default_capacity() {
        let attr = AttributeValue::getter(CoredumpSetting::File).unwrap();
        assert_eq!(attr.size(), DEFAULT_GETTER_CAPACITY);
        assert!(attr.bytes().unwrap().iter().all(|&b| b == 0));
        assert_eq!(attr.get(), AttributeData::Text(String::new()));
    }

    #[test]
    fn test_file_getter_stops_at_nul() {
        let attr = AttributeValue::getter(CoredumpSetting::File).unwrap();
        let path = b"/tmp/core.gpu\0junk";
        unsafe {
            std::ptr::copy_nonoverlapping(path.as_ptr(), attr.address() as *mut u8, path.len())
        };
        assert_eq!(attr.get(), AttributeData::Text("/tmp/core.gpu".into()));
    }

    #[test]
    fn test_pipe_setter_includes_terminator() {
        let attr = AttributeValue::setter(CoredumpSetting::Pipe, &Value::from("/run/dump")).unwrap();
        assert_eq!(attr.size(), "/run/dump".len() + 1);
        assert_eq!(attr.bytes().unwrap(), b"/run/dump\0");
    }

    #[test]
    fn test_interior_nul_rejected() {
        let err = AttributeValue::setter(CoredumpSetting::File, &Value::from("a\0b")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_configured_capacity() {
        let config = MarshalConfig { getter_buffer_capacity: 64, ..Default::default() };
        let attr = AttributeValue::with_config(CoredumpSetting::Pipe, None, true, &config).unwrap();
        assert_eq!(attr.size(), 64);
    }

    #[test]
    fn test_setter_without_value() {
        let err = AttributeValue::new(CoredumpSetting::Lightweight, None, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    #[should_panic]
    fn test_get_on_setter_panics() {
        let attr = AttributeValue::setter(CoredumpSetting::TriggerHost, &Value::from(true)).unwrap();
        let _ = attr.get();
    }
}
