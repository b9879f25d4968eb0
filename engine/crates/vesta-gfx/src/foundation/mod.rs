mod allocator;
mod device;

pub use allocator::GfxAllocationCallbacks;
pub use device::{AshDevice, DeviceFunctions, GfxDevice};
