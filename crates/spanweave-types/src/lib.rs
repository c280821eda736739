//! Core value types shared by the tracker and its callers.
//!
//! Everything here is `Copy` or cheaply cloneable: the tracker never owns
//! buffer memory, it only passes around [`StagedBuffer`] descriptors that
//! point into a pool owned elsewhere via a [`BufferHandle`].

pub mod sequence;
pub mod spanning;
pub mod staged;

pub use sequence::{BufferHandle, SequenceNumber};
pub use spanning::{SequenceShredderResult, SpanningBuffers};
pub use staged::{DelimiterLayout, StagedBuffer};
