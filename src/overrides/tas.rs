//! Frame-accurate input editing session
//!
//! A [`TasInputSession`] owns tool-side widgets, one per overridden control.
//! Each widget pairs a [`CrossThreadControlState`] with a display value that
//! only the presentation role writes. Every tick the override:
//! 1. converts the natural value to the widget's domain
//! 2. reports it through `on_controller_value_changed`, scheduling a mirror
//!    on the presentation queue when it changed
//! 3. returns the reconciled value in place of the natural one

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::cross_thread::CrossThreadControlState;
use super::presentation::PresentationHandle;
use super::{install, is_installed, uninstall, InputOverrider};
use crate::controller::{EmulatedController, InputOverrideFunction};
use crate::device::ControlState;

/// Pressed threshold for boolean widgets
const BUTTON_THRESHOLD: ControlState = 0.5;

/// State shared by a widget and its override closure
struct Widget<T: Copy + PartialEq + Send + 'static> {
    state: Arc<CrossThreadControlState<T>>,
    displayed: Arc<AtomicCell<T>>,
    presentation: PresentationHandle,
}

impl<T: Copy + PartialEq + Send + 'static> Clone for Widget<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            displayed: self.displayed.clone(),
            presentation: self.presentation.clone(),
        }
    }
}

impl<T: Copy + PartialEq + Send + 'static> Widget<T> {
    fn new(initial: T, presentation: PresentationHandle) -> Self {
        Self {
            state: Arc::new(CrossThreadControlState::new(initial)),
            displayed: Arc::new(AtomicCell::new(initial)),
            presentation,
        }
    }

    /// Simulation role: feed a polled value, scheduling a mirror on change
    fn observe(&self, value: T) -> T {
        if self.state.on_controller_value_changed(value) {
            let state = self.state.clone();
            let displayed = self.displayed.clone();
            self.presentation.schedule(move || {
                displayed.store(state.apply_controller_value_change());
            });
        }
        self.state.get_value()
    }

    /// Presentation role: user edit
    fn edit(&self, value: T) {
        self.displayed.store(value);
        self.state.on_ui_value_changed(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Turbo {
    press_frames: u32,
    release_frames: u32,
    started_frame: u64,
}

/// Boolean widget (checkbox) overriding one button
#[derive(Clone)]
pub struct TasButton {
    widget: Widget<bool>,
    turbo: Arc<AtomicCell<Option<Turbo>>>,
    frame: Arc<AtomicU64>,
}

impl TasButton {
    fn new(presentation: PresentationHandle, frame: Arc<AtomicU64>) -> Self {
        Self {
            widget: Widget::new(false, presentation),
            turbo: Arc::new(AtomicCell::new(None)),
            frame,
        }
    }

    /// Override body, run on the simulation thread
    fn override_value(&self, natural: ControlState) -> Option<ControlState> {
        let pressed = self.widget.observe(natural >= BUTTON_THRESHOLD);
        let pressed = match self.turbo.load() {
            Some(turbo) => turbo.is_pressed(self.frame.load(Ordering::Acquire)),
            None => pressed,
        };
        Some(if pressed { 1.0 } else { 0.0 })
    }

    /// User toggled the checkbox
    pub fn edit(&self, pressed: bool) {
        self.widget.edit(pressed);
    }

    /// Value the widget currently shows
    pub fn displayed(&self) -> bool {
        self.widget.displayed.load()
    }

    /// Auto-fire: pressed for `press_frames`, released for `release_frames`, from now on
    pub fn set_turbo(&self, press_frames: u32, release_frames: u32) {
        self.turbo.store(Some(Turbo {
            press_frames,
            release_frames,
            started_frame: self.frame.load(Ordering::Acquire),
        }));
    }

    pub fn clear_turbo(&self) {
        self.turbo.store(None);
    }

    pub fn state(&self) -> &CrossThreadControlState<bool> {
        &self.widget.state
    }
}

impl Turbo {
    fn is_pressed(&self, frame: u64) -> bool {
        let period = u64::from(self.press_frames) + u64::from(self.release_frames);
        if period == 0 {
            return false;
        }
        frame.saturating_sub(self.started_frame) % period < u64::from(self.press_frames)
    }
}

/// Integer mapping used by axis widgets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMapping {
    /// Widget value of a neutral axis
    pub zero_point: i32,
    /// Widget units per unit of control value
    pub scale: f64,
    pub min: i32,
    pub max: i32,
}

impl AxisMapping {
    /// Mapping used for a centred stick axis shown as 0..=255
    pub fn stick() -> Self {
        Self {
            zero_point: 128,
            scale: 127.0,
            min: 0,
            max: 255,
        }
    }

    /// Mapping used for a one-sided trigger shown as 0..=255
    pub fn trigger() -> Self {
        Self {
            zero_point: 0,
            scale: 255.0,
            min: 0,
            max: 255,
        }
    }

    fn to_widget(&self, value: ControlState) -> i32 {
        let scaled = ((value * self.scale).round() as i64).saturating_add(i64::from(self.zero_point));
        scaled.clamp(i64::from(self.min), i64::from(self.max)) as i32
    }

    fn to_control(&self, value: i32) -> ControlState {
        if self.scale == 0.0 {
            return 0.0;
        }
        (i64::from(value) - i64::from(self.zero_point)) as f64 / self.scale
    }
}

/// Integer widget (spin box / slider) overriding one axis
#[derive(Clone)]
pub struct TasAxis {
    widget: Widget<i32>,
    mapping: AxisMapping,
}

impl TasAxis {
    fn new(mut mapping: AxisMapping, presentation: PresentationHandle) -> Self {
        if mapping.min > mapping.max {
            debug!("Axis mapping range {}..={} reversed, swapping", mapping.min, mapping.max);
            std::mem::swap(&mut mapping.min, &mut mapping.max);
        }
        let initial = mapping.zero_point.clamp(mapping.min, mapping.max);
        Self {
            widget: Widget::new(initial, presentation),
            mapping,
        }
    }

    fn override_value(&self, natural: ControlState) -> Option<ControlState> {
        let value = self.widget.observe(self.mapping.to_widget(natural));
        Some(self.mapping.to_control(value))
    }

    /// User typed or dragged a value; clamped to the widget range
    pub fn edit(&self, value: i32) {
        self.widget.edit(value.clamp(self.mapping.min, self.mapping.max));
    }

    pub fn displayed(&self) -> i32 {
        self.widget.displayed.load()
    }

    pub fn mapping(&self) -> AxisMapping {
        self.mapping
    }

    pub fn state(&self) -> &CrossThreadControlState<i32> {
        &self.widget.state
    }
}

/// Set of TAS widgets for one controller
pub struct TasInputSession {
    presentation: PresentationHandle,
    frame: Arc<AtomicU64>,
    overrider: InputOverrider,
    buttons: Vec<(String, String, TasButton)>,
    axes: Vec<(String, String, TasAxis)>,
    /// Dispatch handed to the controller by the last `install`
    installed: Mutex<Option<InputOverrideFunction>>,
}

impl TasInputSession {
    pub fn new(presentation: PresentationHandle) -> Self {
        Self {
            presentation,
            frame: Arc::new(AtomicU64::new(0)),
            overrider: InputOverrider::new(),
            buttons: Vec::new(),
            axes: Vec::new(),
            installed: Mutex::new(None),
        }
    }

    /// Add a checkbox overriding `group/control`
    pub fn add_button(&mut self, group: &str, control: &str) -> TasButton {
        let button = TasButton::new(self.presentation.clone(), self.frame.clone());
        let hook = button.clone();
        self.overrider
            .add_function(group, control, move |natural| hook.override_value(natural));
        self.buttons
            .push((group.to_string(), control.to_string(), button.clone()));
        debug!("TAS button added for {}/{}", group, control);
        button
    }

    /// Add an integer widget overriding `group/control`
    pub fn add_axis(&mut self, group: &str, control: &str, mapping: AxisMapping) -> TasAxis {
        let axis = TasAxis::new(mapping, self.presentation.clone());
        let hook = axis.clone();
        self.overrider
            .add_function(group, control, move |natural| hook.override_value(natural));
        self.axes.push((group.to_string(), control.to_string(), axis.clone()));
        debug!("TAS axis added for {}/{}", group, control);
        axis
    }

    pub fn button(&self, group: &str, control: &str) -> Option<&TasButton> {
        self.buttons
            .iter()
            .find(|(g, c, _)| g == group && c == control)
            .map(|(_, _, b)| b)
    }

    pub fn axis(&self, group: &str, control: &str) -> Option<&TasAxis> {
        self.axes
            .iter()
            .find(|(g, c, _)| g == group && c == control)
            .map(|(_, _, a)| a)
    }

    pub fn overrider(&self) -> &InputOverrider {
        &self.overrider
    }

    /// Advance the frame counter used by turbo; call once per tick
    pub fn next_frame(&self) {
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("TAS frame {}", frame);
    }

    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Show the session: route the controller's reads through its widgets
    pub fn install(&self, controller: &mut EmulatedController) {
        *self.installed.lock() = Some(install(controller, &self.overrider));
    }

    /// Hide the session
    ///
    /// Only removes this session's own dispatch; an override installed on the
    /// controller by someone else since is left in place. Returns whether
    /// anything was removed.
    pub fn uninstall(&self, controller: &mut EmulatedController) -> bool {
        let mut installed = self.installed.lock();
        match installed.as_ref() {
            Some(function) if is_installed(controller, function) => {
                uninstall(controller);
                *installed = None;
                true
            },
            _ => {
                debug!("TAS session not installed on '{}', leaving override", controller.name());
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::presentation::PresentationQueue;

    fn session() -> (TasInputSession, PresentationQueue) {
        let (handle, queue) = PresentationQueue::new();
        (TasInputSession::new(handle), queue)
    }

    fn dispatch(session: &TasInputSession, group: &str, control: &str, natural: f64) -> f64 {
        let f = session.overrider().get_input_override_function();
        f(group, control, natural).unwrap()
    }

    #[test]
    fn test_button_follows_controller_then_edit() {
        let (mut session, mut queue) = session();
        let button = session.add_button("Buttons", "A");

        assert_eq!(dispatch(&session, "Buttons", "A", 1.0), 1.0);
        assert!(!button.displayed());
        assert_eq!(queue.drain(), 1);
        assert!(button.displayed());

        // User unticks: weak override holds while the controller is steady
        button.edit(false);
        assert_eq!(dispatch(&session, "Buttons", "A", 1.0), 0.0);
        assert_eq!(queue.drain(), 0);

        // Controller releases then presses again: controller wins
        assert_eq!(dispatch(&session, "Buttons", "A", 0.0), 0.0);
        assert_eq!(dispatch(&session, "Buttons", "A", 0.9), 1.0);
        queue.drain();
        assert!(button.displayed());
    }

    #[test]
    fn test_button_threshold() {
        let (mut session, _queue) = session();
        session.add_button("Buttons", "A");
        assert_eq!(dispatch(&session, "Buttons", "A", 0.49), 0.0);
        assert_eq!(dispatch(&session, "Buttons", "A", 0.5), 1.0);
    }

    #[test]
    fn test_turbo_alternates_by_frame() {
        let (mut session, _queue) = session();
        let button = session.add_button("Buttons", "A");
        button.set_turbo(2, 1);

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(dispatch(&session, "Buttons", "A", 0.0));
            session.next_frame();
        }
        assert_eq!(seen, vec![1.0, 1.0, 0.0, 1.0, 1.0, 0.0]);

        button.clear_turbo();
        assert_eq!(dispatch(&session, "Buttons", "A", 0.0), 0.0);
    }

    #[test]
    fn test_axis_mapping() {
        let (mut session, mut queue) = session();
        let axis = session.add_axis("Main Stick", "X", AxisMapping::stick());
        assert_eq!(axis.displayed(), 128);

        let out = dispatch(&session, "Main Stick", "X", 1.0);
        assert_eq!(axis.state().cpu_state().value, 255);
        assert_eq!(out, 1.0);
        queue.drain();
        assert_eq!(axis.displayed(), 255);

        // Clamped on both ends
        dispatch(&session, "Main Stick", "X", -2.0);
        assert_eq!(axis.state().cpu_state().value, 0);

        axis.edit(1000);
        assert_eq!(axis.displayed(), 255);
    }

    #[test]
    fn test_axis_edit_until_controller_moves() {
        let (mut session, mut queue) = session();
        let axis = session.add_axis("Triggers", "L", AxisMapping::trigger());

        dispatch(&session, "Triggers", "L", 0.0);
        queue.drain();
        axis.edit(51);
        assert_eq!(dispatch(&session, "Triggers", "L", 0.0), 0.2);
        assert_eq!(dispatch(&session, "Triggers", "L", 1.0), 1.0);
    }

    #[test]
    fn test_install_on_controller() {
        use crate::group::{ControlGroup, GroupType};

        let (mut session, _queue) = session();
        let button = session.add_button("Buttons", "A");
        let mut controller = EmulatedController::new("Pad").with_group(
            ControlGroup::new("Buttons", GroupType::Buttons)
                .with_input("A")
                .with_input("B"),
        );

        session.install(&mut controller);
        button.edit(true);
        assert_eq!(controller.get_state("Buttons", "A"), 1.0);
        assert_eq!(controller.get_state("Buttons", "B"), 0.0);

        assert!(session.uninstall(&mut controller));
        assert_eq!(controller.get_state("Buttons", "A"), 0.0);
        assert!(!session.uninstall(&mut controller));
    }

    #[test]
    fn test_uninstall_leaves_other_override() {
        use crate::group::{ControlGroup, GroupType};

        let (mut session, _queue) = session();
        let button = session.add_button("Buttons", "A");
        let mut controller = EmulatedController::new("Pad")
            .with_group(ControlGroup::new("Buttons", GroupType::Buttons).with_input("A"));

        session.install(&mut controller);
        button.edit(true);

        // Another tool takes over the controller
        let mut other = InputOverrider::new();
        other.add_function("Buttons", "A", |_| Some(0.25));
        install(&mut controller, &other);

        assert!(!session.uninstall(&mut controller));
        assert!(controller.has_input_override());
        assert_eq!(controller.get_state("Buttons", "A"), 0.25);
    }

    #[test]
    fn test_extreme_mapping_does_not_overflow() {
        let (mut session, mut queue) = session();
        let mapping = AxisMapping {
            zero_point: i32::MAX,
            scale: 1.0,
            min: i32::MIN,
            max: i32::MAX,
        };
        let axis = session.add_axis("Stick", "X", mapping);
        assert_eq!(axis.displayed(), i32::MAX);

        assert_eq!(mapping.to_control(i32::MIN), -4_294_967_295.0);
        assert_eq!(mapping.to_widget(f64::MAX), i32::MAX);
        assert_eq!(mapping.to_widget(f64::MIN), i32::MIN);

        axis.edit(i32::MIN);
        queue.drain();
        assert_eq!(dispatch(&session, "Stick", "X", 0.0), -4_294_967_295.0);
    }

    #[test]
    fn test_reversed_mapping_range_is_swapped() {
        let (mut session, _queue) = session();
        let axis = session.add_axis(
            "Stick",
            "X",
            AxisMapping {
                zero_point: 0,
                scale: 10.0,
                min: 100,
                max: -100,
            },
        );
        assert_eq!(axis.mapping().min, -100);
        axis.edit(500);
        assert_eq!(axis.displayed(), 100);
    }
}
