//! `CUmemPool_attribute` and `CUgraphMem_attribute`.

use super::Shape;

attribute_family! {
    /// Memory pool reuse policy and usage counters.
    pub enum MemPoolAttribute("memory pool attribute", ByReference) {
        ReuseFollowEventDependencies = 1 => Some(Shape::Int32),
        ReuseAllowOpportunistic = 2 => Some(Shape::Int32),
        ReuseAllowInternalDependencies = 3 => Some(Shape::Int32),
        ReleaseThreshold = 4 => Some(Shape::UInt64),
        ReservedMemCurrent = 5 => Some(Shape::UInt64),
        ReservedMemHigh = 6 => Some(Shape::UInt64),
        UsedMemCurrent = 7 => Some(Shape::UInt64),
        UsedMemHigh = 8 => Some(Shape::UInt64),
    }
}

attribute_family! {
    /// Per-device graph memory counters.
    pub enum GraphMemAttribute("graph memory attribute", ByReference) {
        UsedMemCurrent = 0 => Some(Shape::UInt64),
        UsedMemHigh = 1 => Some(Shape::UInt64),
        ReservedMemCurrent = 2 => Some(Shape::UInt64),
        ReservedMemHigh = 3 => Some(Shape::UInt64),
    }
}
