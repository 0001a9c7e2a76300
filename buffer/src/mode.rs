//! Addressing modes of a [crate::Buffer].

mod private {
    pub trait Sealed {}
}

/// Selects how a [crate::Buffer] maps cursors onto its backing bytes.
///
/// The mode is resolved at compile time: every position computation branches on
/// [Mode::CIRCULAR], which the optimizer folds away.
pub trait Mode: private::Sealed + Copy + Default + Send + Sync + 'static {
    /// Whether cursors wrap around the end of the backing bytes.
    const CIRCULAR: bool;

    /// Bytes of backing storage that never hold data.
    ///
    /// A circular buffer keeps one byte free so that `read == write` always means empty.
    const RESERVED: usize;
}

/// Linear addressing: cursors only move forward until `clear` or `crunch`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Plain;

impl private::Sealed for Plain {}

impl Mode for Plain {
    const CIRCULAR: bool = false;
    const RESERVED: usize = 0;
}

/// Ring addressing: cursors wrap modulo the size of the backing bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Circular;

impl private::Sealed for Circular {}

impl Mode for Circular {
    const CIRCULAR: bool = true;
    const RESERVED: usize = 1;
}
