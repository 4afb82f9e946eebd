use core::fmt;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use bytemuck::Pod;

/// Non-owning reference to asset data that lives outside the engine.
///
/// Pools, H-Blank registrations and transfers keep these instead of copies and read
/// through them at commit time, so reloading picks up whatever the buffer holds then.
pub struct SourceRef<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T> SourceRef<T> {
    pub fn from_static(data: &'static [T]) -> Self {
        Self { ptr: NonNull::from(data).cast(), len: data.len() }
    }

    /// # Safety
    /// `ptr` must point to `len` initialized elements that stay valid for as long as
    /// any pool entry, H-Blank registration or transfer holds this reference, and
    /// they must not be written while the engine commits.
    pub unsafe fn from_raw(ptr: *const T, len: usize) -> Self {
        assert!(!ptr.is_null(), "Null source");
        Self { ptr: unsafe { NonNull::new_unchecked(ptr as *mut T) }, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Same buffer, not just same contents.
    pub fn same_ref(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.len == other.len
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        // SAFETY: upheld by the constructors
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Pod> SourceRef<T> {
    /// Reinterprets the elements as another type of the same size.
    pub fn cast<U: Pod>(self) -> SourceRef<U> {
        assert_eq!(size_of::<T>(), size_of::<U>(), "Invalid element size");
        assert!(align_of::<T>() >= align_of::<U>(), "Invalid element alignment");
        SourceRef { ptr: self.ptr.cast(), len: self.len }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    pub(crate) fn same_content(&self, other: &Self) -> bool {
        self.same_ref(other) || (self.len == other.len && self.bytes() == other.bytes())
    }
}

impl<T> Clone for SourceRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SourceRef<T> {}

impl<T> PartialEq for SourceRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_ref(other)
    }
}

impl<T> Eq for SourceRef<T> {}

impl<T> fmt::Debug for SourceRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRef").field("ptr", &self.ptr).field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static WORDS: [u16; 4] = [1, 2, 3, 4];
    static SAME_WORDS: [u16; 4] = [1, 2, 3, 4];

    #[test]
    fn content_and_identity_differ() {
        let a = SourceRef::from_static(&WORDS);
        let b = SourceRef::from_static(&SAME_WORDS);
        assert!(!a.same_ref(&b));
        assert!(a.same_content(&b));
        assert!(a.same_content(&a));
        assert_eq!(a.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn cast_keeps_length() {
        let signed: SourceRef<i16> = SourceRef::from_static(&WORDS).cast();
        assert_eq!(signed.len(), 4);
        assert_eq!(signed.as_slice()[3], 4);
    }
}
