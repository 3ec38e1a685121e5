use crate::core::geo::{LatLng, Point};
use crate::core::viewport::{OrientationMode, SharedView};

/// Numeric gesture signals delivered by the host's recognizer, in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    /// Drag by a delta
    Pan { dx: f64, dy: f64 },
    /// Pinch; any factor above one zooms in a level, anything else zooms out
    Zoom { factor: f64, focus_x: f64, focus_y: f64 },
    /// Drag released with a velocity in pixels per second
    Fling { vx: f64, vy: f64 },
    DoubleTap { x: f64, y: f64 },
    SetOrientation(OrientationMode),
    Resize { width: f64, height: f64 },
    /// Recenter on a coordinate
    CenterOn(LatLng),
}

/// Cloneable handle that applies gestures to the view from any thread.
///
/// Every operation takes the view lock for its own duration only, so a pinch
/// and a drag arriving together both land on the same state.
#[derive(Debug, Clone)]
pub struct GestureInput {
    view: SharedView,
}

impl GestureInput {
    pub fn new(view: SharedView) -> Self {
        Self { view }
    }

    pub fn apply(&self, event: GestureEvent) {
        log::trace!("gesture {:?}", event);
        match event {
            GestureEvent::Pan { dx, dy } => self.pan(dx, dy),
            GestureEvent::Zoom {
                factor,
                focus_x,
                focus_y,
            } => {
                self.zoom(factor, focus_x, focus_y);
            }
            GestureEvent::Fling { vx, vy } => self.fling(vx, vy),
            GestureEvent::DoubleTap { x, y } => {
                self.double_tap(x, y);
            }
            GestureEvent::SetOrientation(mode) => self.set_orientation(mode),
            GestureEvent::Resize { width, height } => self.set_viewport_size(width, height),
            GestureEvent::CenterOn(center) => self.set_center(center),
        }
    }

    /// A finger on the map stops any fling in progress
    pub fn pan(&self, dx: f64, dy: f64) {
        self.view.update(|view| {
            view.cancel_fling();
            view.pan(dx, dy);
        });
    }

    pub fn zoom(&self, factor: f64, focus_x: f64, focus_y: f64) -> bool {
        self.view.update(|view| view.zoom(factor, focus_x, focus_y))
    }

    pub fn fling(&self, vx: f64, vy: f64) {
        self.view.update(|view| view.fling(vx, vy));
    }

    pub fn double_tap(&self, x: f64, y: f64) -> bool {
        self.view.update(|view| view.double_tap(x, y))
    }

    pub fn set_orientation(&self, mode: OrientationMode) {
        self.view.update(|view| view.set_orientation(mode));
    }

    pub fn set_viewport_size(&self, width: f64, height: f64) {
        self.view
            .update(|view| view.set_viewport_size(Point::new(width, height)));
    }

    pub fn set_center(&self, center: LatLng) {
        self.view.update(|view| view.set_center(center));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ViewConfig;
    use crate::core::viewport::ViewState;
    use std::sync::Arc;

    fn input() -> (SharedView, GestureInput) {
        let view = SharedView::new(ViewState::new(
            &ViewConfig::default(),
            Point::new(400.0, 400.0),
        ));
        let input = GestureInput::new(view.clone());
        (view, input)
    }

    #[test]
    fn test_events_reach_view() {
        let (view, input) = input();
        let zoom = view.snapshot().zoom_level();

        input.apply(GestureEvent::DoubleTap { x: 200.0, y: 200.0 });
        assert_eq!(view.snapshot().zoom_level(), zoom + 1);

        input.apply(GestureEvent::Zoom {
            factor: 0.5,
            focus_x: 200.0,
            focus_y: 200.0,
        });
        assert_eq!(view.snapshot().zoom_level(), zoom);

        input.apply(GestureEvent::SetOrientation(OrientationMode::HeadingUp));
        assert_eq!(view.snapshot().orientation(), OrientationMode::HeadingUp);

        input.apply(GestureEvent::Resize {
            width: 1024.0,
            height: 768.0,
        });
        assert_eq!(view.snapshot().size(), Point::new(1024.0, 768.0));
    }

    #[test]
    fn test_pan_stops_fling() {
        let (view, input) = input();
        input.apply(GestureEvent::Fling { vx: 500.0, vy: 0.0 });
        assert!(view.snapshot().fling_velocity().is_some());
        input.apply(GestureEvent::Pan { dx: 1.0, dy: 0.0 });
        assert!(view.snapshot().fling_velocity().is_none());
    }

    #[test]
    fn test_concurrent_pan_and_zoom_accumulate() {
        let (view, input) = input();
        let input = Arc::new(input);
        let start = view.snapshot().center_planar();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let input = Arc::clone(&input);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        if i == 0 {
                            input.zoom(1.5, 200.0, 200.0);
                            input.zoom(0.5, 200.0, 200.0);
                        } else {
                            input.pan(-1.0, 0.0);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let end = view.snapshot();
        assert_eq!(end.zoom_level(), ViewConfig::default().initial_zoom);
        // Each pan lands at whichever level is current, one level in halves the distance
        let moved_px = (end.center_planar().x - start.x) / end.meters_per_pixel();
        assert!(moved_px > 37.5 - 1e-6 && moved_px < 75.0 + 1e-6, "moved {moved_px}");
    }
}
