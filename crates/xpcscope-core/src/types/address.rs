//! Memory address type.

use std::fmt;
use std::ops::Add;

/// Strongly typed memory address
///
/// This wrapper around `u64` keeps runtime addresses apart from the other
/// `u64` values flowing through the resolver (symbol table values, slides,
/// string table offsets).
///
/// ## Example
///
/// ```rust
/// use xpcscope_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Apply a load bias (slide) to this address
    ///
    /// Slides are signed: an image can be mapped below its preferred address.
    /// The arithmetic wraps, matching how the loader itself applies slides.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use xpcscope_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.slid(0x20), Address::from(0x1020));
    /// assert_eq!(addr.slid(-0x20), Address::from(0xfe0));
    /// ```
    pub const fn slid(self, slide: i64) -> Self
    {
        Address(self.0.wrapping_add_signed(slide))
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}
