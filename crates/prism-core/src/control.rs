//! The control-surface contract and an in-memory inspector panel.
//!
//! A control surface is a generic property inspector. The orchestrator only
//! adds controls, removes them, reads a value, and drains change events;
//! how the controls are drawn is up to the host.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{PrismError, PrismResult};

/// Opaque handle to a control on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlHandle(pub u64);

impl std::fmt::Display for ControlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The value carried by a control.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Choice(String),
    Bool(bool),
    Number(f64),
}

impl std::fmt::Display for ControlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlValue::Choice(s) => write!(f, "{}", s),
            ControlValue::Bool(b) => write!(f, "{}", b),
            ControlValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// What kind of widget a control is, with its initial value.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    /// Drop-down selector.
    Choice { options: Vec<String>, selected: String },
    /// Checkbox.
    Toggle { value: bool },
    /// Slider.
    Range { min: f64, max: f64, step: f64, value: f64 },
}

impl ControlKind {
    fn initial_value(&self) -> ControlValue {
        match self {
            ControlKind::Choice { selected, .. } => ControlValue::Choice(selected.clone()),
            ControlKind::Toggle { value } => ControlValue::Bool(*value),
            ControlKind::Range { value, .. } => ControlValue::Number(*value),
        }
    }
}

/// Description of a control to add.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub name: String,
    pub kind: ControlKind,
}

impl ControlSpec {
    pub fn choice(name: impl Into<String>, options: Vec<String>, selected: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ControlKind::Choice {
                options,
                selected: selected.into(),
            },
        }
    }

    pub fn toggle(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            kind: ControlKind::Toggle { value },
        }
    }

    pub fn range(name: impl Into<String>, min: f64, max: f64, step: f64, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: ControlKind::Range {
                min,
                max,
                step,
                value,
            },
        }
    }
}

/// A user-driven change to a control.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub handle: ControlHandle,
    pub value: ControlValue,
}

/// A property inspector the orchestrator can populate.
pub trait ControlSurface {
    /// Add a control and return its handle.
    fn add_control(&mut self, spec: ControlSpec) -> ControlHandle;

    /// Remove a control. Removing an unknown handle is a no-op.
    fn remove_control(&mut self, handle: ControlHandle);

    /// Current value of a control.
    fn value(&self, handle: ControlHandle) -> Option<ControlValue>;

    /// Take all change events queued since the last call.
    fn drain_events(&mut self) -> Vec<ControlEvent>;
}

/// A control currently on an [`InspectorPanel`].
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub handle: ControlHandle,
    pub spec: ControlSpec,
    pub value: ControlValue,
}

/// In-memory control surface.
///
/// Controls keep insertion order. [`InspectorPanel::user_change`] plays the
/// part of the user: it validates the new value against the control, stores
/// it, and queues a [`ControlEvent`].
#[derive(Debug, Default)]
pub struct InspectorPanel {
    controls: BTreeMap<ControlHandle, Control>,
    events: VecDeque<ControlEvent>,
    next_handle: u64,
}

impl InspectorPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.values()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// All controls with the given name.
    pub fn find(&self, name: &str) -> Vec<&Control> {
        self.controls
            .values()
            .filter(|c| c.spec.name == name)
            .collect()
    }

    pub fn handle_of(&self, name: &str) -> Option<ControlHandle> {
        self.controls
            .values()
            .find(|c| c.spec.name == name)
            .map(|c| c.handle)
    }

    /// Apply a user change to a control and queue the matching event.
    pub fn user_change(&mut self, handle: ControlHandle, value: ControlValue) -> PrismResult<()> {
        let control = self
            .controls
            .get_mut(&handle)
            .ok_or_else(|| PrismError::Control(format!("no control with handle {}", handle)))?;

        let value = match (&control.spec.kind, value) {
            (ControlKind::Choice { options, .. }, ControlValue::Choice(choice)) => {
                if !options.contains(&choice) {
                    return Err(PrismError::InvalidArgument(format!(
                        "'{}' is not an option of '{}'",
                        choice, control.spec.name
                    )));
                }
                ControlValue::Choice(choice)
            }
            (ControlKind::Toggle { .. }, ControlValue::Bool(b)) => ControlValue::Bool(b),
            (ControlKind::Range { min, max, step, .. }, ControlValue::Number(n)) => {
                let stepped = if *step > 0.0 {
                    min + ((n - min) / step).round() * step
                } else {
                    n
                };
                ControlValue::Number(stepped.clamp(*min, *max))
            }
            (_, value) => {
                return Err(PrismError::InvalidArgument(format!(
                    "value '{}' does not fit control '{}'",
                    value, control.spec.name
                )))
            }
        };

        control.value = value.clone();
        self.events.push_back(ControlEvent { handle, value });
        Ok(())
    }
}

impl ControlSurface for InspectorPanel {
    fn add_control(&mut self, spec: ControlSpec) -> ControlHandle {
        self.next_handle += 1;
        let handle = ControlHandle(self.next_handle);
        let value = spec.kind.initial_value();
        self.controls.insert(handle, Control { handle, spec, value });
        handle
    }

    fn remove_control(&mut self, handle: ControlHandle) {
        self.controls.remove(&handle);
        // Events for a control that no longer exists are stale.
        self.events.retain(|e| e.handle != handle);
    }

    fn value(&self, handle: ControlHandle) -> Option<ControlValue> {
        self.controls.get(&handle).map(|c| c.value.clone())
    }

    fn drain_events(&mut self) -> Vec<ControlEvent> {
        self.events.drain(..).collect()
    }
}
