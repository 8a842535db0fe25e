//! Physical byte storage for bindings
//!
//! A physical buffer has exactly one owning binding, which holds the only
//! strong reference. Offset children and nested members hold weak
//! references and write inside their own range; they never keep the
//! buffer alive and never resize it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{LayoutError, LayoutResult};
use crate::foundation::math::{is_aligned, round_up, STRUCT_ALIGNMENT};

/// Receives byte images for device upload
pub trait UploadTarget {
    /// Write `bytes` into the device buffer `label` at `offset`
    fn write_buffer(&mut self, label: &str, offset: usize, bytes: &[u8]);
}

/// A reserved sub-range of a physical buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Reservation id, unique within its buffer
    pub id: u64,
    /// Start of the range
    pub offset: usize,
    /// Length of the range
    pub len: usize,
}

impl Reservation {
    /// End of the range
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    const fn overlaps(&self, offset: usize, len: usize) -> bool {
        offset < self.end() && self.offset < offset + len
    }
}

/// Byte image plus the ranges handed out inside it
#[derive(Debug)]
pub struct SharedBuffer {
    label: String,
    bytes: Vec<u8>,
    reservations: Vec<Reservation>,
    next_id: u64,
}

/// Owning handle to a physical buffer
pub type BufferHandle = Rc<RefCell<SharedBuffer>>;

impl SharedBuffer {
    /// Allocate `capacity` zeroed bytes with the owner's fields occupying `[0, owner_len)`
    pub fn new(label: impl Into<String>, owner_len: usize, capacity: usize) -> Self {
        let capacity = round_up(capacity.max(owner_len), STRUCT_ALIGNMENT);
        Self {
            label: label.into(),
            bytes: vec![0; capacity],
            reservations: vec![Reservation {
                id: 0,
                offset: 0,
                len: owner_len,
            }],
            next_id: 1,
        }
    }

    /// Buffer label used for uploads
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Physical size in bytes
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Whole byte image
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whole byte image, mutable
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Current reservations, owner range first
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Reserve `len` bytes.
    ///
    /// With `at`, the offset must be a multiple of `granularity` and must not
    /// overlap an existing range. Without it, the range starts at the first
    /// `granularity` boundary after every existing range. When the range ends
    /// past the capacity the buffer grows if `allow_growth`, otherwise the
    /// reservation fails.
    pub fn reserve(
        &mut self,
        len: usize,
        granularity: usize,
        at: Option<usize>,
        allow_growth: bool,
    ) -> LayoutResult<Reservation> {
        let offset = match at {
            Some(offset) => {
                if !is_aligned(offset, granularity) {
                    return Err(LayoutError::Layout(format!(
                        "offset {} in '{}' is not a multiple of {}",
                        offset, self.label, granularity
                    )));
                }
                if let Some(existing) = self.reservations.iter().find(|r| r.overlaps(offset, len)) {
                    return Err(LayoutError::Layout(format!(
                        "range {}..{} in '{}' overlaps reserved range {}..{}",
                        offset,
                        offset + len,
                        self.label,
                        existing.offset,
                        existing.end()
                    )));
                }
                offset
            }
            None => {
                let end = self.reservations.iter().map(Reservation::end).max().unwrap_or(0);
                round_up(end, granularity)
            }
        };

        let end = offset + len;
        if end > self.capacity() {
            if !allow_growth {
                return Err(LayoutError::Layout(format!(
                    "range {}..{} exceeds the {}-byte capacity of '{}'",
                    offset,
                    end,
                    self.capacity(),
                    self.label
                )));
            }
            let grown = round_up(end, STRUCT_ALIGNMENT);
            log::warn!("Growing buffer '{}' from {} to {} bytes", self.label, self.capacity(), grown);
            self.bytes.resize(grown, 0);
        }

        let reservation = Reservation {
            id: self.next_id,
            offset,
            len,
        };
        self.next_id += 1;
        self.reservations.push(reservation);
        Ok(reservation)
    }

    /// Return a range to the buffer
    pub fn release(&mut self, id: u64) {
        self.reservations.retain(|r| r.id != id || id == 0);
    }
}

/// Where a binding's bytes live
#[derive(Debug)]
pub(crate) enum Storage {
    /// Laid out but not yet attached to a buffer
    Detached,
    /// Owns the physical buffer; fields occupy `[0, len)`
    Owned { buffer: BufferHandle, len: usize },
    /// Writes into `[offset, offset + len)` of a parent's buffer
    Delegated {
        parent: Weak<RefCell<SharedBuffer>>,
        label: String,
        offset: usize,
        len: usize,
        reservation: Option<u64>,
    },
}

impl Storage {
    pub(crate) fn owned(label: &str, len: usize, capacity: usize) -> Self {
        Self::Owned {
            buffer: Rc::new(RefCell::new(SharedBuffer::new(label, len, capacity))),
            len,
        }
    }

    pub(crate) fn delegated(parent: &BufferHandle, offset: usize, len: usize, reservation: Option<u64>) -> Self {
        Self::Delegated {
            label: parent.borrow().label().to_string(),
            parent: Rc::downgrade(parent),
            offset,
            len,
            reservation,
        }
    }

    /// Offset of this binding inside the physical buffer
    pub(crate) const fn offset(&self) -> usize {
        match self {
            Self::Delegated { offset, .. } => *offset,
            Self::Detached | Self::Owned { .. } => 0,
        }
    }

    pub(crate) const fn is_owner(&self) -> bool {
        matches!(self, Self::Owned { .. })
    }

    /// Strong handle to the physical buffer
    pub(crate) fn handle(&self) -> LayoutResult<BufferHandle> {
        match self {
            Self::Owned { buffer, .. } => Ok(Rc::clone(buffer)),
            Self::Delegated { parent, label, .. } => parent
                .upgrade()
                .ok_or_else(|| LayoutError::Layout(format!("parent buffer '{}' was released", label))),
            Self::Detached => Err(LayoutError::Layout("binding has no storage attached".to_string())),
        }
    }

    fn region(&self) -> (usize, usize) {
        match self {
            Self::Owned { len, .. } => (0, *len),
            Self::Delegated { offset, len, .. } => (*offset, *len),
            Self::Detached => (0, 0),
        }
    }

    /// Run `f` on this binding's mutable byte range
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> LayoutResult<R>) -> LayoutResult<R> {
        let handle = self.handle()?;
        let mut buffer = handle.borrow_mut();
        let (offset, len) = self.region();
        let limit = buffer.capacity();
        let region = buffer
            .bytes_mut()
            .get_mut(offset..offset + len)
            .ok_or(LayoutError::Range { offset, len, limit })?;
        f(region)
    }

    /// Run `f` on this binding's byte range
    pub(crate) fn read<R>(&self, f: impl FnOnce(&[u8]) -> LayoutResult<R>) -> LayoutResult<R> {
        let handle = self.handle()?;
        let buffer = handle.borrow();
        let (offset, len) = self.region();
        let region = buffer
            .bytes()
            .get(offset..offset + len)
            .ok_or(LayoutError::Range { offset, len, limit: buffer.capacity() })?;
        f(region)
    }

    /// Write raw bytes at `offset` relative to this binding's range
    pub(crate) fn write_raw(&self, offset: usize, bytes: &[u8]) -> LayoutResult<()> {
        let (_, len) = self.region();
        let range_error = LayoutError::Range {
            offset,
            len: bytes.len(),
            limit: len,
        };
        let end = match offset.checked_add(bytes.len()) {
            Some(end) if end <= len => end,
            _ => return Err(range_error),
        };
        self.write(|region| {
            region[offset..end].copy_from_slice(bytes);
            Ok(())
        })
    }

    /// Send the bytes this binding is responsible for to `target`.
    ///
    /// Owners upload the whole physical buffer, delegates only their range.
    pub(crate) fn upload(&self, target: &mut dyn UploadTarget) -> LayoutResult<()> {
        let handle = self.handle()?;
        let buffer = handle.borrow();
        match self {
            Self::Owned { .. } => target.write_buffer(buffer.label(), 0, buffer.bytes()),
            _ => {
                let (offset, len) = self.region();
                let bytes = buffer.bytes().get(offset..offset + len).ok_or(LayoutError::Range {
                    offset,
                    len,
                    limit: buffer.capacity(),
                })?;
                target.write_buffer(buffer.label(), offset, bytes);
            }
        }
        Ok(())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        match self {
            Self::Owned { buffer, .. } => {
                if Rc::strong_count(buffer) == 1 {
                    let buffer = buffer.borrow();
                    log::trace!("Releasing buffer '{}' ({} bytes)", buffer.label(), buffer.capacity());
                }
            }
            Self::Delegated {
                parent,
                reservation: Some(id),
                ..
            } => {
                if let Some(parent) = parent.upgrade() {
                    parent.borrow_mut().release(*id);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automatic_reservation_rounds_to_granularity() {
        let mut buffer = SharedBuffer::new("frame", 48, 1024);
        let first = buffer.reserve(32, 256, None, false).unwrap();
        assert_eq!(first.offset, 256);

        let second = buffer.reserve(64, 256, None, false).unwrap();
        assert_eq!(second.offset, 512);
        assert_eq!(buffer.capacity(), 1024);
    }

    #[test]
    fn test_explicit_offset_checks() {
        let mut buffer = SharedBuffer::new("frame", 48, 1024);

        let err = buffer.reserve(16, 256, Some(100), false).unwrap_err();
        assert!(matches!(err, LayoutError::Layout(_)));

        assert!(buffer.reserve(16, 16, Some(32), false).is_err());

        let reservation = buffer.reserve(16, 256, Some(256), false).unwrap();
        assert_eq!(reservation.offset, 256);
        assert!(buffer.reserve(16, 256, Some(256), false).is_err());
    }

    #[test]
    fn test_capacity_exceeded_without_growth() {
        let mut buffer = SharedBuffer::new("frame", 16, 256);
        let err = buffer.reserve(64, 256, None, false).unwrap_err();
        assert!(matches!(err, LayoutError::Layout(_)));
    }

    #[test]
    fn test_growth_when_allowed() {
        let mut buffer = SharedBuffer::new("frame", 16, 256);
        let reservation = buffer.reserve(40, 256, None, true).unwrap();
        assert_eq!(reservation.offset, 256);
        assert_eq!(buffer.capacity(), 304);
    }

    #[test]
    fn test_release_frees_range() {
        let mut buffer = SharedBuffer::new("frame", 16, 1024);
        let reservation = buffer.reserve(16, 256, Some(256), false).unwrap();
        buffer.release(reservation.id);
        assert!(buffer.reserve(16, 256, Some(256), false).is_ok());

        buffer.release(0);
        assert_eq!(buffer.reservations()[0].len, 16);
    }

    #[test]
    fn test_delegated_write_outside_range() {
        let owner = Storage::owned("frame", 16, 1024);
        let handle = owner.handle().unwrap();
        let child = Storage::delegated(&handle, 256, 16, None);

        child.write_raw(12, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&handle.borrow().bytes()[268..272], &[1, 2, 3, 4]);

        let err = child.write_raw(14, &[0; 4]).unwrap_err();
        assert!(matches!(err, LayoutError::Range { offset: 14, len: 4, limit: 16 }));
    }

    #[test]
    fn test_write_at_huge_offset_is_a_range_error() {
        let owner = Storage::owned("frame", 16, 64);
        let err = owner.write_raw(usize::MAX - 1, &[0; 4]).unwrap_err();
        assert!(matches!(err, LayoutError::Range { len: 4, limit: 16, .. }));
    }

    #[test]
    fn test_delegate_does_not_keep_parent_alive() {
        let owner = Storage::owned("frame", 16, 64);
        let child = Storage::delegated(&owner.handle().unwrap(), 16, 16, None);
        drop(owner);
        assert!(matches!(child.write_raw(0, &[0; 4]), Err(LayoutError::Layout(_))));
    }
}
