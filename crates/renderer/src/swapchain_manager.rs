//! Swapchain, depth buffer and framebuffers as one unit.
//!
//! The frame loop only ever sees a complete set: recreation tears down the
//! framebuffers, the depth buffer and the chain, then builds all three again
//! inside a single `&mut self` call.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use toybox_core::PresentModePreference;
use toybox_rhi::RhiResult;
use toybox_rhi::device::Device;
use toybox_rhi::physical_device::SurfaceSupport;
use toybox_rhi::render_pass::{Framebuffer, RenderPass};
use toybox_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};

use crate::context::DeviceContext;
use crate::depth_buffer::DepthBuffer;
use crate::scene_pipeline::ScenePipeline;

/// One render target per swapchain image.
///
/// `rebuild` drops every previous target before creating the new ones, so
/// no target bound to a destroyed image view survives a rebuild. Each
/// rebuild bumps `generation`.
#[derive(Debug)]
pub struct PresentTargets<T> {
    targets: Vec<T>,
    generation: u64,
}

impl<T> Default for PresentTargets<T> {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            generation: 0,
        }
    }
}

impl<T> PresentTargets<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all targets with `count` new ones from `factory`.
    ///
    /// On error the list is left empty.
    pub fn rebuild<E, F>(&mut self, count: usize, mut factory: F) -> Result<(), E>
    where
        F: FnMut(usize) -> Result<T, E>,
    {
        self.targets.clear();
        self.generation += 1;

        let mut targets = Vec::with_capacity(count);
        for index in 0..count {
            targets.push(factory(index)?);
        }
        self.targets = targets;
        Ok(())
    }

    /// Drops every target.
    pub fn clear(&mut self) {
        self.targets.clear();
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.targets.get(index)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What [`SwapchainManager::recreate`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// The surface has no area (minimised window); nothing was touched.
    Deferred,
    /// A new chain is in place; the render pass was rebuilt if the surface
    /// format changed.
    Recreated { format_changed: bool },
}

/// Owns the presentable images and everything sized to them.
///
/// Field order is drop order: framebuffers, then depth, then the chain whose
/// views the framebuffers reference.
pub struct SwapchainManager {
    framebuffers: PresentTargets<Framebuffer>,
    depth: Option<DepthBuffer>,
    swapchain: Swapchain,
    device: Arc<Device>,
}

impl SwapchainManager {
    /// Creates the chain and its depth buffer. Framebuffers need the render
    /// pass and are built by [`SwapchainManager::rebuild_framebuffers`].
    pub fn new(
        context: &DeviceContext,
        desired_extent: vk::Extent2D,
        preference: PresentModePreference,
    ) -> RhiResult<Self> {
        let device = context.device().clone();
        let swapchain = Swapchain::new(
            context.instance(),
            device.clone(),
            context.surface_support(),
            desired_extent,
            preference,
        )?;
        let depth = DepthBuffer::with_best_format(device.clone(), swapchain.extent())?;

        Ok(Self {
            framebuffers: PresentTargets::new(),
            depth: Some(depth),
            swapchain,
            device,
        })
    }

    /// Builds one framebuffer per swapchain image against `render_pass`.
    pub fn rebuild_framebuffers(&mut self, render_pass: &RenderPass) -> RhiResult<()> {
        let Some(depth) = self.depth.as_ref() else {
            return Err(toybox_rhi::RhiError::InvalidHandle(
                "framebuffers requested without a depth buffer".to_string(),
            ));
        };

        let extent = self.swapchain.extent();
        let depth_view = depth.view();
        let views = self.swapchain.image_views();
        let device = &self.device;

        self.framebuffers.rebuild(views.len(), |index| {
            Framebuffer::new(
                device.clone(),
                render_pass,
                &[views[index].handle(), depth_view],
                extent,
            )
        })?;

        debug!(
            "Built {} framebuffers (generation {})",
            self.framebuffers.len(),
            self.framebuffers.generation()
        );
        Ok(())
    }

    /// Rebuilds the chain for the current surface.
    ///
    /// Waits for the device to go idle first. When the surface reports a zero
    /// extent nothing is destroyed and [`RecreateOutcome::Deferred`] comes
    /// back. `pipeline` is rebuilt only if the attachment formats changed.
    ///
    /// # Errors
    ///
    /// Any failure leaves the manager without framebuffers; callers treat
    /// it as fatal.
    pub fn recreate(
        &mut self,
        surface: SurfaceSupport<'_>,
        desired_extent: vk::Extent2D,
        pipeline: &mut ScenePipeline,
    ) -> RhiResult<RecreateOutcome> {
        let extent = self.swapchain.query_extent(surface, desired_extent)?;
        if extent.width == 0 || extent.height == 0 {
            debug!("Surface has zero area, deferring swapchain recreation");
            return Ok(RecreateOutcome::Deferred);
        }

        self.device.wait_idle()?;

        let old_format = self.swapchain.format();
        self.framebuffers.clear();
        self.depth = None;

        self.swapchain.recreate(surface, desired_extent)?;
        let depth = DepthBuffer::with_best_format(self.device.clone(), self.swapchain.extent())?;

        let format_changed = pipeline.needs_rebuild(self.swapchain.format(), depth.format());
        if format_changed {
            info!(
                "Surface format changed {:?} -> {:?}, rebuilding render pass",
                old_format,
                self.swapchain.format()
            );
            pipeline.rebuild(self.swapchain.format(), depth.format())?;
        }

        self.depth = Some(depth);
        self.rebuild_framebuffers(pipeline.render_pass())?;

        Ok(RecreateOutcome::Recreated { format_changed })
    }

    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        self.swapchain.acquire_next_image(semaphore)
    }

    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<PresentOutcome> {
        self.swapchain
            .present(self.device.present_queue(), image_index, wait_semaphore)
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(image_index as usize)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Depth format in use; falls back to undefined between teardown and rebuild.
    pub fn depth_format(&self) -> vk::Format {
        self.depth
            .as_ref()
            .map_or(vk::Format::UNDEFINED, DepthBuffer::format)
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Counts how many instances are alive.
    struct Tracked {
        live: Rc<Cell<usize>>,
        index: usize,
    }

    impl Tracked {
        fn new(live: &Rc<Cell<usize>>, index: usize) -> Self {
            live.set(live.get() + 1);
            Self {
                live: live.clone(),
                index,
            }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    #[test]
    fn test_rebuild_never_leaks() {
        let live = Rc::new(Cell::new(0));
        let mut targets = PresentTargets::new();

        for (round, count) in [3usize, 2, 4, 4, 1, 3].into_iter().enumerate() {
            targets
                .rebuild(count, |i| Ok::<_, ()>(Tracked::new(&live, i)))
                .unwrap();

            assert_eq!(targets.len(), count);
            assert_eq!(live.get(), count);
            assert_eq!(targets.generation(), round as u64 + 1);
        }

        drop(targets);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn test_old_targets_dropped_before_new_ones_built() {
        let live = Rc::new(Cell::new(0));
        let mut targets = PresentTargets::new();
        targets
            .rebuild(3, |i| Ok::<_, ()>(Tracked::new(&live, i)))
            .unwrap();

        targets
            .rebuild(2, |i| {
                // Nothing from the previous generation may still exist.
                assert_eq!(live.get(), i);
                Ok::<_, ()>(Tracked::new(&live, i))
            })
            .unwrap();
        assert_eq!(live.get(), 2);
    }

    #[test]
    fn test_targets_indexed_by_image() {
        let live = Rc::new(Cell::new(0));
        let mut targets = PresentTargets::new();
        targets
            .rebuild(3, |i| Ok::<_, ()>(Tracked::new(&live, i)))
            .unwrap();

        assert_eq!(targets.get(2).map(|t| t.index), Some(2));
        assert!(targets.get(3).is_none());
    }

    #[test]
    fn test_failed_rebuild_leaves_nothing_alive() {
        let live = Rc::new(Cell::new(0));
        let mut targets = PresentTargets::new();
        targets
            .rebuild(2, |i| Ok::<_, &str>(Tracked::new(&live, i)))
            .unwrap();

        let result = targets.rebuild(3, |i| {
            if i == 1 {
                Err("view creation failed")
            } else {
                Ok(Tracked::new(&live, i))
            }
        });

        assert_eq!(result.err(), Some("view creation failed"));
        assert!(targets.is_empty());
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn test_clear() {
        let live = Rc::new(Cell::new(0));
        let mut targets = PresentTargets::new();
        targets
            .rebuild(2, |i| Ok::<_, ()>(Tracked::new(&live, i)))
            .unwrap();
        targets.clear();
        assert!(targets.is_empty());
        assert_eq!(live.get(), 0);
        assert_eq!(targets.generation(), 1);
    }
}
