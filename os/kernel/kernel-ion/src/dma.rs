//! # Device Synchronization

use crate::scatterlist::ScatterList;

/// Direction of a cache maintenance operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DmaDirection {
    ToDevice,
    FromDevice,
    Bidirectional,
}

/// Cache maintenance over the extents of a buffer, provided by the
/// buffer-sharing device.
///
/// Only invoked for buffers allocated with
/// [`BufferFlags::sync_force`](crate::BufferFlags::sync_force). Failures are
/// not reported; the operation is assumed to always complete.
pub trait DeviceSync {
    fn sync_for_device(&self, table: &ScatterList, direction: DmaDirection);
}

impl<T> DeviceSync for &T
where
    T: DeviceSync + ?Sized,
{
    fn sync_for_device(&self, table: &ScatterList, direction: DmaDirection) {
        (**self).sync_for_device(table, direction);
    }
}
