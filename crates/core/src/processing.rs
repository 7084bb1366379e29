//! Frame-processing boundary.
//!
//! Completed access units can be handed to a [`FrameProcessor`] before
//! they are packetized again (filters, format conversion, re-encoding).
//! The framing layer treats frames as opaque Annex B buffers and only
//! requires that a processor returns a buffer of the same kind.

use crate::assembler::AccessUnit;
use crate::error::Result;

/// Transforms one access unit into another.
///
/// Implementations run on the forwarding path of a single track, so they
/// get `&mut self` and may keep state between frames.
pub trait FrameProcessor: Send {
    /// Process one frame. Errors drop the frame and are reported to the caller.
    fn process(&mut self, frame: AccessUnit) -> Result<AccessUnit>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "processor"
    }
}

/// Forwards frames unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl FrameProcessor for Passthrough {
    fn process(&mut self, frame: AccessUnit) -> Result<AccessUnit> {
        Ok(frame)
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

impl<F> FrameProcessor for F
where
    F: FnMut(AccessUnit) -> Result<AccessUnit> + Send,
{
    fn process(&mut self, frame: AccessUnit) -> Result<AccessUnit> {
        self(frame)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}
