//! Automatable parameter with sample-accurate scheduling
//!
//! Mirrors the subset of Web Audio `AudioParam` semantics the pipeline needs:
//! step changes, linear ramps, cancellation, and cancel-and-hold. Values are
//! evaluated against context time, never wall-clock time.

#[derive(Debug, Clone, Copy, PartialEq)]
enum AutomationEvent {
    SetValue { value: f32, time: f64 },
    LinearRamp { value: f32, end_time: f64 },
}

impl AutomationEvent {
    fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. } => time,
            AutomationEvent::LinearRamp { end_time, .. } => end_time,
        }
    }
}

/// An automatable value clamped to `[min, max]`
#[derive(Debug, Clone)]
pub struct AudioParam {
    value: f32,
    min: f32,
    max: f32,
    events: Vec<AutomationEvent>,
}

impl AudioParam {
    /// Create a parameter with an intrinsic value and a nominal range
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            value: value.clamp(min, max),
            min,
            max,
            events: Vec::new(),
        }
    }

    /// Intrinsic value used before any automation event
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Set the intrinsic value and drop every scheduled event
    pub fn set_value(&mut self, value: f32) {
        self.value = self.clamp(value);
        self.events.clear();
    }

    pub fn min_value(&self) -> f32 {
        self.min
    }

    pub fn max_value(&self) -> f32 {
        self.max
    }

    /// Number of pending automation events
    pub fn scheduled_events(&self) -> usize {
        self.events.len()
    }

    /// Step to `value` at context time `time`
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        let value = self.clamp(value);
        self.insert(AutomationEvent::SetValue {
            value,
            time: time.max(0.0),
        });
    }

    /// Ramp linearly from the previous event to `value`, arriving at `end_time`
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, end_time: f64) {
        let value = self.clamp(value);
        self.insert(AutomationEvent::LinearRamp {
            value,
            end_time: end_time.max(0.0),
        });
    }

    /// Remove every event scheduled at or after `time`
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|event| event.time() < time);
    }

    /// Freeze the curve at whatever value it has at `time`
    ///
    /// Events after `time` are dropped and a step to the held value is
    /// scheduled at `time`, so a subsequent ramp starts from where the curve
    /// actually is rather than jumping.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);
        self.cancel_scheduled_values(time);
        self.insert(AutomationEvent::SetValue { value: held, time });
    }

    /// Evaluate the automation curve at context time `time`
    pub fn value_at(&self, time: f64) -> f32 {
        let mut anchor_time = 0.0;
        let mut anchor_value = self.value;

        for event in &self.events {
            match *event {
                AutomationEvent::SetValue { value, time: at } => {
                    if time < at {
                        return self.clamp(anchor_value);
                    }
                    anchor_time = at;
                    anchor_value = value;
                }
                AutomationEvent::LinearRamp { value, end_time } => {
                    if time < end_time {
                        let span = end_time - anchor_time;
                        if span <= 0.0 {
                            return self.clamp(value);
                        }
                        let progress = ((time - anchor_time) / span).clamp(0.0, 1.0) as f32;
                        return self.clamp(anchor_value + (value - anchor_value) * progress);
                    }
                    anchor_time = end_time;
                    anchor_value = value;
                }
            }
        }

        self.clamp(anchor_value)
    }

    /// Collapse events that are entirely in the past
    ///
    /// Keeps the event list bounded across a long streaming session.
    pub fn prune_before(&mut self, time: f64) {
        if self.events.iter().all(|event| event.time() > time) {
            return;
        }
        let current = self.value_at(time);
        self.events.retain(|event| event.time() > time);
        if self.events.is_empty() {
            self.value = current;
        } else {
            self.events.insert(
                0,
                AutomationEvent::SetValue {
                    value: current,
                    time,
                },
            );
        }
    }

    fn insert(&mut self, event: AutomationEvent) {
        let at = event.time();
        let index = self
            .events
            .iter()
            .position(|existing| existing.time() > at)
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
    }

    fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gain() -> AudioParam {
        AudioParam::new(1.0, 0.0, 1.0)
    }

    #[test]
    fn intrinsic_value_without_events() {
        let param = gain();
        assert_eq!(param.value_at(0.0), 1.0);
        assert_eq!(param.value_at(100.0), 1.0);
    }

    #[test]
    fn step_takes_effect_at_its_time() {
        let mut param = gain();
        param.set_value_at_time(0.25, 1.0);
        assert_eq!(param.value_at(0.999), 1.0);
        assert_eq!(param.value_at(1.0), 0.25);
        assert_eq!(param.value_at(5.0), 0.25);
    }

    #[test]
    fn linear_ramp_interpolates_from_previous_event() {
        let mut param = gain();
        param.set_value_at_time(1.0, 2.0);
        param.linear_ramp_to_value_at_time(0.0, 3.0);

        assert_eq!(param.value_at(2.0), 1.0);
        assert!((param.value_at(2.5) - 0.5).abs() < 1e-6);
        assert_eq!(param.value_at(3.0), 0.0);
        assert_eq!(param.value_at(10.0), 0.0);
    }

    #[test]
    fn cancel_and_hold_freezes_mid_ramp() {
        let mut param = gain();
        param.set_value_at_time(1.0, 0.0);
        param.linear_ramp_to_value_at_time(0.0, 1.0);

        param.cancel_and_hold_at_time(0.25);

        assert!((param.value_at(0.25) - 0.75).abs() < 1e-6);
        assert!((param.value_at(4.0) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn ramp_after_hold_starts_from_held_value() {
        let mut param = gain();
        param.set_value_at_time(1.0, 0.0);
        param.linear_ramp_to_value_at_time(0.0, 1.0);
        param.cancel_and_hold_at_time(0.5);
        param.linear_ramp_to_value_at_time(1.0, 1.5);

        assert!((param.value_at(0.5) - 0.5).abs() < 1e-6);
        assert!((param.value_at(1.0) - 0.75).abs() < 1e-6);
        assert_eq!(param.value_at(1.5), 1.0);
    }

    #[test]
    fn values_are_clamped_to_range() {
        let mut param = gain();
        param.set_value_at_time(3.0, 0.0);
        assert_eq!(param.value_at(0.0), 1.0);
        param.set_value_at_time(-2.0, 1.0);
        assert_eq!(param.value_at(1.0), 0.0);
        param.set_value_at_time(f32::NAN, 2.0);
        assert_eq!(param.value_at(2.0), 0.0);
    }

    #[test]
    fn prune_keeps_curve_shape() {
        let mut param = gain();
        param.set_value_at_time(1.0, 0.0);
        param.linear_ramp_to_value_at_time(0.0, 1.0);
        param.linear_ramp_to_value_at_time(1.0, 2.0);

        param.prune_before(1.5);

        assert!((param.value_at(1.5) - 0.5).abs() < 1e-6);
        assert!((param.value_at(1.75) - 0.75).abs() < 1e-6);
        assert_eq!(param.value_at(2.0), 1.0);

        param.prune_before(3.0);
        assert_eq!(param.scheduled_events(), 0);
        assert_eq!(param.value(), 1.0);
    }

    #[test]
    fn cancel_scheduled_values_drops_future_events() {
        let mut param = gain();
        param.set_value_at_time(0.5, 1.0);
        param.set_value_at_time(0.1, 2.0);
        param.cancel_scheduled_values(1.5);

        assert_eq!(param.scheduled_events(), 1);
        assert_eq!(param.value_at(3.0), 0.5);
    }
}
