//! Mode descriptors: memory space and numeric precisions for solver objects.
//!
//! Every matrix, vector, and solver is created against exactly one [`Mode`],
//! resolved once from a four-character descriptor such as `"dDDI"`. The slots
//! select, in order: memory space, vector value precision, matrix value
//! precision, and index precision. Unrecognized descriptors fail with
//! [`AmgError::InvalidMode`] at resolve time; nothing is deferred to first use.

use std::fmt;
use std::str::FromStr;

use crate::error::AmgError;

/// Where object data lives from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    /// Device (GPU) memory.
    Device,
    /// Host memory.
    Host,
}

/// Floating-point precision for matrix or vector values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValuePrecision {
    /// 64-bit IEEE floats.
    Double,
    /// 32-bit IEEE floats.
    Float,
}

/// Integer precision for row pointers and column indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexPrecision {
    /// 32-bit signed indices.
    Int32,
}

/// A resolved 4-slot mode. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    pub memory: MemorySpace,
    pub vector: ValuePrecision,
    pub matrix: ValuePrecision,
    pub index: IndexPrecision,
}

impl Mode {
    /// Resolve a descriptor token into a typed mode.
    ///
    /// Supported descriptors: `dDDI`, `dDFI`, `dFFI`, `hDDI`, `hDFI`, `hFFI`.
    /// Vector precision below matrix precision (`*FD*`) is not a supported
    /// combination and is rejected like any other unknown token.
    pub fn resolve(descriptor: &str) -> Result<Self, AmgError> {
        let invalid = || AmgError::InvalidMode(descriptor.to_string());
        let mut chars = descriptor.chars();
        let (m, v, a, i) = match (chars.next(), chars.next(), chars.next(), chars.next()) {
            (Some(m), Some(v), Some(a), Some(i)) if chars.next().is_none() => (m, v, a, i),
            _ => return Err(invalid()),
        };
        let memory = match m {
            'd' => MemorySpace::Device,
            'h' => MemorySpace::Host,
            _ => return Err(invalid()),
        };
        let vector = match v {
            'D' => ValuePrecision::Double,
            'F' => ValuePrecision::Float,
            _ => return Err(invalid()),
        };
        let matrix = match a {
            'D' => ValuePrecision::Double,
            'F' => ValuePrecision::Float,
            _ => return Err(invalid()),
        };
        // Matrix values wider than vector values would force per-spmv
        // down-conversion in the engine; that pairing is not in the
        // supported set.
        if vector == ValuePrecision::Float && matrix == ValuePrecision::Double {
            return Err(invalid());
        }
        let index = match i {
            'I' => IndexPrecision::Int32,
            _ => return Err(invalid()),
        };
        Ok(Mode { memory, vector, matrix, index })
    }

    /// The descriptor this mode round-trips to.
    pub fn descriptor(&self) -> String {
        let m = match self.memory {
            MemorySpace::Device => 'd',
            MemorySpace::Host => 'h',
        };
        let v = match self.vector {
            ValuePrecision::Double => 'D',
            ValuePrecision::Float => 'F',
        };
        let a = match self.matrix {
            ValuePrecision::Double => 'D',
            ValuePrecision::Float => 'F',
        };
        format!("{m}{v}{a}I")
    }
}

impl FromStr for Mode {
    type Err = AmgError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::resolve(s)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}
