//! Window-system events as seen by the renderer.
//!
//! The renderer never talks to winit directly. The application translates
//! winit window events into [`PlatformEvent`]s, queues them, and the frame
//! loop drains the queue through [`EventSource::poll_events`] once per tick.

use std::collections::VecDeque;

use winit::event::WindowEvent;

/// Platform events the frame loop reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The framebuffer changed size, in physical pixels. Zero while minimised.
    Resized { width: u32, height: u32 },
    CloseRequested,
    RedrawRequested,
}

impl PlatformEvent {
    /// Maps the winit events we care about; everything else is `None`.
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::Resized(size) => Some(Self::Resized {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::CloseRequested => Some(Self::CloseRequested),
            WindowEvent::RedrawRequested => Some(Self::RedrawRequested),
            _ => None,
        }
    }
}

/// Anything that can hand out the events gathered since the last poll.
pub trait EventSource {
    /// Drains pending events, oldest first.
    fn poll_events(&mut self) -> Vec<PlatformEvent>;
}

/// FIFO of pending platform events.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<PlatformEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PlatformEvent) {
        // Only the latest size matters.
        if let PlatformEvent::Resized { .. } = event
            && let Some(last) = self.pending.back_mut()
            && matches!(last, PlatformEvent::Resized { .. })
        {
            *last = event;
            return;
        }
        self.pending.push_back(event);
    }

    /// Queues the translation of `event`, if it has one.
    pub fn push_window_event(&mut self, event: &WindowEvent) {
        if let Some(event) = PlatformEvent::from_window_event(event) {
            self.push(event);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl EventSource for EventQueue {
    fn poll_events(&mut self) -> Vec<PlatformEvent> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn test_translates_resize() {
        let event = WindowEvent::Resized(PhysicalSize::new(640, 480));
        assert_eq!(
            PlatformEvent::from_window_event(&event),
            Some(PlatformEvent::Resized {
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn test_ignores_unrelated_events() {
        assert_eq!(
            PlatformEvent::from_window_event(&WindowEvent::Focused(true)),
            None
        );
    }

    #[test]
    fn test_poll_drains_in_order() {
        let mut queue = EventQueue::new();
        queue.push(PlatformEvent::RedrawRequested);
        queue.push(PlatformEvent::CloseRequested);

        assert_eq!(
            queue.poll_events(),
            vec![PlatformEvent::RedrawRequested, PlatformEvent::CloseRequested]
        );
        assert!(queue.is_empty());
        assert!(queue.poll_events().is_empty());
    }

    #[test]
    fn test_consecutive_resizes_coalesce() {
        let mut queue = EventQueue::new();
        queue.push(PlatformEvent::Resized { width: 100, height: 100 });
        queue.push(PlatformEvent::Resized { width: 200, height: 150 });
        queue.push(PlatformEvent::RedrawRequested);
        queue.push(PlatformEvent::Resized { width: 0, height: 0 });

        assert_eq!(
            queue.poll_events(),
            vec![
                PlatformEvent::Resized { width: 200, height: 150 },
                PlatformEvent::RedrawRequested,
                PlatformEvent::Resized { width: 0, height: 0 },
            ]
        );
    }
}
