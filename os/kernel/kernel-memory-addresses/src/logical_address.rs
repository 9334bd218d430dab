use crate::MemoryAddress;
use core::fmt;
use core::ops::{Add, AddAssign, Sub};
use core::ptr::NonNull;

/// Logical (translated) memory address.
///
/// What the CPU issues once paging is on. A logical address decomposes into
/// directory, optional attacher, table and offset fields whose widths depend
/// on the translation scheme; see [`field`](Self::field) for the raw
/// extraction used by the translators.
///
/// ### Invariants
/// - No invariant beyond "this is intended to be a logical address".
/// - Converting to a pointer is only meaningful in the address space that
///   currently translates it.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let la = LogicalAddress::new(0x8040_1234);
/// assert_eq!(la.field(22, 10), 0x201);
/// assert_eq!(la.field(12, 10), 0x001);
/// assert_eq!(la.field(0, 12), 0x234);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LogicalAddress(pub(crate) MemoryAddress);

impl LogicalAddress {
    pub const NULL: Self = Self(MemoryAddress::NULL);

    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self(MemoryAddress::from_nonnull(ptr))
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(MemoryAddress::from_ptr(ptr))
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::NULL
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Reinterpret as a raw pointer in the current address space.
    #[inline]
    #[must_use]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.as_u64() as usize as *mut T
    }

    #[inline]
    #[must_use]
    pub fn as_ptr<T>(self) -> *const T {
        self.as_u64() as usize as *const T
    }

    #[inline]
    #[must_use]
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0.align_down(align))
    }

    #[inline]
    #[must_use]
    pub const fn align_up(self, align: u64) -> Self {
        Self(self.0.align_up(align))
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0.is_aligned(align)
    }

    /// Extract the `width`-bit field starting at bit `shift`.
    #[inline]
    #[must_use]
    pub const fn field(self, shift: u32, width: u32) -> u64 {
        self.0.field(shift, width)
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for LogicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<LogicalAddress> for u64 {
    #[inline]
    fn from(a: LogicalAddress) -> Self {
        a.as_u64()
    }
}

impl Add<u64> for LogicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for LogicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for LogicalAddress {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}
