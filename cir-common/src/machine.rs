//! Target data models
//!
//! This module defines the per-dialect machine description consumed by the
//! layout engine and the constant folder: byte sizes for the multi-byte
//! primitive types, the alignments that differ from the size, char
//! signedness, and the MSVC-dialect flag that selects packing rules and
//! output spellings.

use serde::{Deserialize, Serialize};

/// Byte sizes and alignments for one compilation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    /// Size of short in bytes
    pub sizeof_short: u32,
    /// Size of int in bytes
    pub sizeof_int: u32,
    /// Size of long in bytes
    pub sizeof_long: u32,
    /// Size of long long in bytes
    pub sizeof_longlong: u32,
    /// Size of an enum in bytes
    pub sizeof_enum: u32,
    /// Size of a pointer in bytes
    pub sizeof_ptr: u32,
    /// Size of float in bytes
    pub sizeof_float: u32,
    /// Size of double in bytes
    pub sizeof_double: u32,
    /// Size of long double in bytes
    pub sizeof_longdouble: u32,
    /// Size of va_list in bytes
    pub sizeof_valist: u32,
    /// Alignment of long long in bytes
    pub alignof_longlong: u32,
    /// Alignment of double in bytes
    pub alignof_double: u32,
    /// Alignment of long double in bytes
    pub alignof_longdouble: u32,
    /// Whether plain char is unsigned on this target
    pub char_is_unsigned: bool,
    /// Whether this target uses the MSVC dialect (packing rules, output
    /// spellings, integer suffixes)
    pub msvc: bool,
}

impl Machine {
    /// A 32-bit GCC-family target (ILP32)
    pub fn gcc32() -> Self {
        Self {
            sizeof_short: 2,
            sizeof_int: 4,
            sizeof_long: 4,
            sizeof_longlong: 8,
            sizeof_enum: 4,
            sizeof_ptr: 4,
            sizeof_float: 4,
            sizeof_double: 8,
            sizeof_longdouble: 12,
            sizeof_valist: 4,
            alignof_longlong: 4,
            alignof_double: 4,
            alignof_longdouble: 4,
            char_is_unsigned: false,
            msvc: false,
        }
    }

    /// A 64-bit GCC-family target (LP64)
    pub fn gcc64() -> Self {
        Self {
            sizeof_short: 2,
            sizeof_int: 4,
            sizeof_long: 8,
            sizeof_longlong: 8,
            sizeof_enum: 4,
            sizeof_ptr: 8,
            sizeof_float: 4,
            sizeof_double: 8,
            sizeof_longdouble: 16,
            sizeof_valist: 24,
            alignof_longlong: 8,
            alignof_double: 8,
            alignof_longdouble: 16,
            char_is_unsigned: false,
            msvc: false,
        }
    }

    /// A 32-bit MSVC-family target
    pub fn msvc32() -> Self {
        Self {
            sizeof_short: 2,
            sizeof_int: 4,
            sizeof_long: 4,
            sizeof_longlong: 8,
            sizeof_enum: 4,
            sizeof_ptr: 4,
            sizeof_float: 4,
            sizeof_double: 8,
            sizeof_longdouble: 8,
            sizeof_valist: 4,
            alignof_longlong: 8,
            alignof_double: 8,
            alignof_longdouble: 8,
            char_is_unsigned: false,
            msvc: true,
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::gcc32()
    }
}
