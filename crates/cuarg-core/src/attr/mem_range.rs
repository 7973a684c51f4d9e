//! `CUmem_range_attribute`.

use super::Shape;

attribute_family! {
    /// Attributes of a managed memory range.
    pub enum MemRangeAttribute("memory range attribute", ByReference) {
        ReadMostly = 1 => Some(Shape::Int32),
        PreferredLocation = 2 => Some(Shape::Int32),
        AccessedBy = 3 => Some(Shape::Int32Array),
        LastPrefetchLocation = 4 => Some(Shape::Int32),
        PreferredLocationType = 5 => Some(Shape::Int32),
        PreferredLocationId = 6 => Some(Shape::Int32),
        LastPrefetchLocationType = 7 => Some(Shape::Int32),
        LastPrefetchLocationId = 8 => Some(Shape::Int32),
    }
}
