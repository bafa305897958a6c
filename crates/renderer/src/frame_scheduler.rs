//! Frame scheduling over a ring of in-flight slots.
//!
//! [`FrameScheduler`] owns the CPU side of the frame loop: which slot is
//! current, what state each slot is in, whether the swapchain must be rebuilt
//! before the next draw. Everything that touches the GPU goes through the
//! [`FrameBackend`] trait, so the state machine can be driven by a scripted
//! backend in tests.
//!
//! # Slot lifecycle
//!
//! ```text
//! Idle ──acquire──▶ Acquiring ──record──▶ Recording ──submit──▶ Submitted
//!  ▲                    │                                           │
//!  │                    └──── out of date (skip tick) ──────┐       │
//!  └────────────────────────── fence wait ◀─────────────────┴───────┘
//! ```
//!
//! A slot only leaves `Submitted` through a fence wait, so its command buffer
//! and uniform buffer are never touched while the GPU may still read them.

use std::fmt;

use tracing::{debug, trace};

use toybox_rhi::RhiResult;
use toybox_rhi::swapchain::{AcquireOutcome, PresentOutcome};

/// Where a frame slot is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// The slot's previous submission has retired.
    Idle,
    /// Waiting for a swapchain image.
    Acquiring,
    /// The command buffer is being recorded.
    Recording,
    /// Handed to the graphics queue; the fence is pending.
    Submitted,
}

/// What a call to [`FrameScheduler::frame_render`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// A command buffer was submitted and an image awaits presentation.
    Submitted,
    /// Nothing was drawn this tick (swapchain rebuilt or deferred).
    Skipped,
}

/// GPU operations behind one frame tick.
///
/// `slot` is always below [`FrameBackend::slot_count`].
pub trait FrameBackend {
    /// Number of frames in flight.
    fn slot_count(&self) -> usize;

    /// Blocks until the slot's previous submission has retired.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires the next image, signalling the slot's acquire semaphore.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Refreshes the slot's uniforms and records the draw into its command
    /// buffer for `image_index`. Must leave the slot's fence untouched.
    fn record_commands(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Resets the slot's fence and submits its command buffer, signalling
    /// its render semaphore and fence.
    fn submit(&mut self, slot: usize) -> RhiResult<()>;

    /// Presents `image_index` once the slot's render semaphore is signalled.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Rebuilds the swapchain. Returns `false` when the surface has no area
    /// and recreation has to wait.
    fn recreate_swapchain(&mut self) -> RhiResult<bool>;
}

/// Observer for slot state transitions.
pub type SlotProbe = Box<dyn FnMut(usize, SlotState)>;

/// Drives the acquire, record, submit and present cycle.
pub struct FrameScheduler {
    states: Vec<SlotState>,
    current: usize,
    /// Slot and image submitted by the last `frame_render`, not yet presented.
    pending_present: Option<(usize, u32)>,
    /// Set by the window collaborator between ticks.
    resize_requested: bool,
    /// The last acquire reported a suboptimal chain.
    suboptimal: bool,
    /// Rebuild the swapchain before drawing again.
    needs_recreate: bool,
    probe: Option<SlotProbe>,
}

impl FrameScheduler {
    /// Creates a scheduler with `slot_count` idle slots.
    pub fn new(slot_count: usize) -> Self {
        let slot_count = slot_count.max(1);
        debug!("Frame scheduler created with {} slot(s)", slot_count);

        Self {
            states: vec![SlotState::Idle; slot_count],
            current: 0,
            pending_present: None,
            resize_requested: false,
            suboptimal: false,
            needs_recreate: false,
            probe: None,
        }
    }

    /// Installs an observer called on every slot state change.
    pub fn with_probe(mut self, probe: impl FnMut(usize, SlotState) + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.states.len()
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.states.get(slot).copied()
    }

    /// True when the next `frame_render` rebuilds the swapchain instead of
    /// drawing.
    #[inline]
    pub fn recreate_pending(&self) -> bool {
        self.needs_recreate
    }

    /// Records an external resize. Consumed by the next `frame_present`.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        debug!("Resize notified: {}x{}", width, height);
        self.resize_requested = true;
    }

    /// Runs the CPU side of one frame on the current slot.
    ///
    /// # Errors
    ///
    /// Backend failures propagate unchanged. The slot index still advances
    /// if submission fails.
    pub fn frame_render<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<FrameStatus> {
        if self.needs_recreate {
            if backend.recreate_swapchain()? {
                self.needs_recreate = false;
            }
            return Ok(FrameStatus::Skipped);
        }

        let slot = self.current;

        backend.wait_for_slot(slot)?;
        self.transition(slot, SlotState::Idle);

        self.transition(slot, SlotState::Acquiring);
        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                self.suboptimal |= suboptimal;
                image_index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire, skipping frame");
                // No submission happened, so the fence is still signalled.
                self.transition(slot, SlotState::Idle);
                self.needs_recreate = !backend.recreate_swapchain()?;
                return Ok(FrameStatus::Skipped);
            }
        };

        self.transition(slot, SlotState::Recording);
        backend.record_commands(slot, image_index)?;

        let submitted = backend.submit(slot);
        self.current = (self.current + 1) % self.states.len();
        submitted?;

        self.transition(slot, SlotState::Submitted);
        self.pending_present = Some((slot, image_index));

        Ok(FrameStatus::Submitted)
    }

    /// Presents the image submitted by the last `frame_render`, if any.
    ///
    /// A stale chain, a suboptimal acquire or a pending resize schedule a
    /// swapchain rebuild for the next tick.
    pub fn frame_present<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<()> {
        let stale = match self.pending_present.take() {
            Some((slot, image_index)) => {
                backend.present(slot, image_index)? == PresentOutcome::Stale
            }
            None => false,
        };

        if stale || self.suboptimal || self.resize_requested {
            debug!(
                "Scheduling swapchain recreation (stale: {}, suboptimal: {}, resized: {})",
                stale, self.suboptimal, self.resize_requested
            );
            self.needs_recreate = true;
            self.suboptimal = false;
            self.resize_requested = false;
        }

        Ok(())
    }

    fn transition(&mut self, slot: usize, state: SlotState) {
        if self.states[slot] == state {
            return;
        }
        trace!("Slot {}: {:?} -> {:?}", slot, self.states[slot], state);
        self.states[slot] = state;
        if let Some(probe) = self.probe.as_mut() {
            probe(slot, state);
        }
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("states", &self.states)
            .field("current", &self.current)
            .field("pending_present", &self.pending_present)
            .field("resize_requested", &self.resize_requested)
            .field("needs_recreate", &self.needs_recreate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use toybox_rhi::RhiError;
    use toybox_rhi::vk;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Backend that replays scripted acquire/present outcomes and logs calls.
    struct ScriptedBackend {
        slots: usize,
        images: u32,
        next_image: u32,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        recreates: VecDeque<bool>,
        fail_record: bool,
        fail_submit: bool,
        /// Per-slot fence; a wait on an unsignalled fence would never return.
        fences: Vec<bool>,
        calls: Vec<Call>,
    }

    impl ScriptedBackend {
        fn new(slots: usize) -> Self {
            Self {
                slots,
                images: 3,
                next_image: 0,
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                recreates: VecDeque::new(),
                fail_record: false,
                fail_submit: false,
                fences: vec![true; slots],
                calls: Vec::new(),
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl FrameBackend for ScriptedBackend {
        fn slot_count(&self) -> usize {
            self.slots
        }

        fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
            self.calls.push(Call::Wait(slot));
            if self.fences[slot] {
                Ok(())
            } else {
                Err(RhiError::VulkanError(vk::Result::TIMEOUT))
            }
        }

        fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.images;
                AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }))
        }

        fn record_commands(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
            self.calls.push(Call::Record(slot, image_index));
            if self.fail_record {
                Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
            } else {
                Ok(())
            }
        }

        fn submit(&mut self, slot: usize) -> RhiResult<()> {
            self.calls.push(Call::Submit(slot));
            self.fences[slot] = false;
            if self.fail_submit {
                Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
            } else {
                // Work retires immediately.
                self.fences[slot] = true;
                Ok(())
            }
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self
                .presents
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn recreate_swapchain(&mut self) -> RhiResult<bool> {
            self.calls.push(Call::Recreate);
            Ok(self.recreates.pop_front().unwrap_or(true))
        }
    }

    fn tick(scheduler: &mut FrameScheduler, backend: &mut ScriptedBackend) -> FrameStatus {
        let status = scheduler.frame_render(backend).unwrap();
        scheduler.frame_present(backend).unwrap();
        status
    }

    fn probed(slots: usize) -> (FrameScheduler, Rc<RefCell<Vec<(usize, SlotState)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let scheduler =
            FrameScheduler::new(slots).with_probe(move |slot, state| sink.borrow_mut().push((slot, state)));
        (scheduler, log)
    }

    /// Checks that `states` walks the Idle, Acquiring, Recording, Submitted
    /// cycle, allowing an Acquiring slot to fall back to Idle.
    fn assert_lifecycle(states: &[SlotState]) {
        let mut previous = SlotState::Idle;
        for &state in states {
            let allowed = match previous {
                SlotState::Idle => state == SlotState::Acquiring,
                SlotState::Acquiring => {
                    state == SlotState::Recording || state == SlotState::Idle
                }
                SlotState::Recording => state == SlotState::Submitted,
                SlotState::Submitted => state == SlotState::Idle,
            };
            assert!(allowed, "illegal transition {:?} -> {:?} in {:?}", previous, state, states);
            previous = state;
        }
    }

    #[test]
    fn test_steady_state_round_robin() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);

        for _ in 0..4 {
            assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Submitted);
        }

        let submits: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![0, 1, 0, 1]);
        assert_eq!(backend.count(|c| *c == Call::Recreate), 0);
    }

    #[test]
    fn test_operations_ordered_within_tick() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);

        tick(&mut scheduler, &mut backend);

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(scheduler.slot_state(0), Some(SlotState::Submitted));
        assert_eq!(scheduler.current_slot(), 1);
    }

    #[test]
    fn test_probe_sees_lifecycle_subsequence() {
        let (mut scheduler, log) = probed(3);
        let mut backend = ScriptedBackend::new(3);
        backend.acquires.extend([
            AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false,
            },
            AcquireOutcome::OutOfDate,
        ]);
        backend.presents.extend([
            PresentOutcome::Presented,
            PresentOutcome::Stale,
        ]);

        for i in 0..12 {
            if i == 5 {
                scheduler.notify_resize(640, 480);
            }
            tick(&mut scheduler, &mut backend);
        }

        let log = log.borrow();
        for slot in 0..3 {
            let states: Vec<_> = log
                .iter()
                .filter(|(s, _)| *s == slot)
                .map(|(_, state)| *state)
                .collect();
            assert!(!states.is_empty());
            assert_lifecycle(&states);
        }
    }

    #[test]
    fn test_present_out_of_date_recreates_before_next_draw() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);
        backend.presents.push_back(PresentOutcome::Stale);

        tick(&mut scheduler, &mut backend);
        assert!(scheduler.recreate_pending());

        let before = backend.calls.len();
        let status = tick(&mut scheduler, &mut backend);
        assert_eq!(status, FrameStatus::Skipped);

        // The skipped tick only recreated.
        assert_eq!(&backend.calls[before..], &[Call::Recreate]);
        assert!(!scheduler.recreate_pending());

        let before = backend.calls.len();
        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Submitted);
        assert!(matches!(backend.calls[before], Call::Wait(_)));
    }

    #[test]
    fn test_acquire_out_of_date_skips_without_submit() {
        let (mut scheduler, log) = probed(2);
        let mut backend = ScriptedBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);

        let status = tick(&mut scheduler, &mut backend);

        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(
            backend.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]
        );
        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(scheduler.slot_state(0), Some(SlotState::Idle));
        assert_eq!(
            *log.borrow(),
            vec![(0, SlotState::Acquiring), (0, SlotState::Idle)]
        );

        // Recreated in place, so the next tick draws.
        assert!(!scheduler.recreate_pending());
        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Submitted);
    }

    #[test]
    fn test_zero_area_defers_until_surface_returns() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        backend.recreates.extend([false, false, true]);

        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Skipped);
        assert!(scheduler.recreate_pending());
        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Skipped);
        assert!(scheduler.recreate_pending());
        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Skipped);
        assert!(!scheduler.recreate_pending());

        assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 0);
        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Submitted);
    }

    #[test]
    fn test_resize_flag_consumed_at_present() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);

        scheduler.notify_resize(800, 600);
        assert!(!scheduler.recreate_pending());

        // The frame already under way still draws and presents.
        assert_eq!(scheduler.frame_render(&mut backend).unwrap(), FrameStatus::Submitted);
        scheduler.frame_present(&mut backend).unwrap();
        assert!(scheduler.recreate_pending());
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 1);

        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Skipped);
        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Submitted);
        assert_eq!(backend.count(|c| *c == Call::Recreate), 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_draws() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        });

        assert_eq!(tick(&mut scheduler, &mut backend), FrameStatus::Submitted);
        assert!(backend.calls.contains(&Call::Present(0, 1)));
        assert!(scheduler.recreate_pending());
    }

    #[test]
    fn test_failed_submit_still_advances_slot() {
        let mut scheduler = FrameScheduler::new(3);
        let mut backend = ScriptedBackend::new(3);
        backend.fail_submit = true;

        assert!(scheduler.frame_render(&mut backend).is_err());
        assert_eq!(scheduler.current_slot(), 1);

        // Nothing to present for a failed submission.
        scheduler.frame_present(&mut backend).unwrap();
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 0);
    }

    #[test]
    fn test_failed_record_leaves_slot_waitable() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);
        backend.fail_record = true;

        assert!(scheduler.frame_render(&mut backend).is_err());
        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Submit(_))), 0);
        assert!(backend.fences[0]);

        backend.fail_record = false;
        assert_eq!(
            scheduler.frame_render(&mut backend).unwrap(),
            FrameStatus::Submitted
        );
        assert_eq!(scheduler.slot_state(0), Some(SlotState::Submitted));
        assert_eq!(backend.count(|c| *c == Call::Wait(0)), 2);
    }

    #[test]
    fn test_present_without_render_is_noop() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = ScriptedBackend::new(2);

        scheduler.frame_present(&mut backend).unwrap();
        assert!(backend.calls.is_empty());
        assert!(!scheduler.recreate_pending());
    }

    #[test]
    fn test_zero_slots_clamped() {
        let scheduler = FrameScheduler::new(0);
        assert_eq!(scheduler.slot_count(), 1);
    }
}
