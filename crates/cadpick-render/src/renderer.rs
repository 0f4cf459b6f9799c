//! The seam between picking and a GPU context.

use cadpick_core::PickCamera;

use crate::error::RenderResult;
use crate::pipeline::DrawItem;
use crate::readback::PendingReadback;
use crate::target::PixelRect;

/// A backend that can render draw lists into an off-screen RGBA8 target and
/// read pixels back from it.
///
/// Implementations are not reentrant: a render followed by a readback of the
/// same target must not be interleaved with another render. Callers serialize
/// access (see the picking handler's mutex).
pub trait PickRenderer: Send {
    /// Off-screen color target (plus whatever depth attachment it needs).
    type Target: Send;

    /// Creates a `width` x `height` target.
    fn create_target(&mut self, width: u32, height: u32) -> RenderResult<Self::Target>;

    /// Resizes `target` in place.
    fn resize_target(&mut self, target: &mut Self::Target, width: u32, height: u32) -> RenderResult<()>;

    /// Clears `target` to `clear` and draws `draws` with depth testing.
    fn render(
        &mut self,
        draws: &[DrawItem],
        camera: &PickCamera,
        target: &mut Self::Target,
        clear: [u8; 4],
    ) -> RenderResult<()>;

    /// Copies `rect` into `out` (tightly packed RGBA8, top row first),
    /// blocking until the data is available.
    fn read_pixels(&mut self, target: &Self::Target, rect: PixelRect, out: &mut [u8]) -> RenderResult<()>;

    /// Starts copying `rect` and returns a future for the bytes.
    ///
    /// The target may be rendered to again once this returns; the copy has
    /// already been captured.
    fn read_pixels_deferred(&mut self, target: &Self::Target, rect: PixelRect) -> RenderResult<PendingReadback>;
}
