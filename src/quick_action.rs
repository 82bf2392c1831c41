//! Scripted controller input
//!
//! A quick action is a named list of steps. Each step holds a stick direction
//! and/or a set of buttons for a duration, after which the buttons are released
//! and the stick re-centred. Actions are loaded from the config file or built in.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::protocol::{ButtonState, Button, ControllerKind, StickDirection, StickSide};

/// Step and wait length of the built-in circle action
const CIRCLE_STEP_MS: u64 = 80;

/// One timed step of a quick action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// How long the input is held
    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stick: Option<StickSide>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<StickDirection>,

    /// Stick displacement (0.0 to 1.0)
    #[serde(default = "default_force")]
    pub force: f32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

fn default_force() -> f32 { 1.0 }
fn default_repeat() -> u32 { 1 }

impl ActionStep {
    /// Do nothing for `duration_ms`
    pub fn wait(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            stick: None,
            direction: None,
            force: default_force(),
            buttons: Vec::new(),
        }
    }

    pub fn stick(side: StickSide, direction: StickDirection, duration_ms: u64) -> Self {
        Self {
            stick: Some(side),
            direction: Some(direction),
            ..Self::wait(duration_ms)
        }
    }

    pub fn buttons(buttons: Vec<Button>, duration_ms: u64) -> Self {
        Self {
            buttons,
            ..Self::wait(duration_ms)
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn is_wait(&self) -> bool {
        self.stick.is_none() && self.buttons.is_empty()
    }

    fn validate(&self, kind: ControllerKind, context: &str) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.force) {
            return Err(ConfigError::Invalid(format!(
                "{}: force must be between 0.0 and 1.0",
                context
            )));
        }

        match (self.stick, self.direction) {
            (Some(side), Some(_)) => {
                if !kind.has_stick(side) {
                    return Err(ConfigError::Invalid(format!(
                        "{}: {:?} stick is not available on the {}",
                        context, side, kind
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "{}: stick and direction must be given together",
                    context
                )));
            }
        }

        let legal = ButtonState::available_buttons(kind);
        if let Some(button) = self.buttons.iter().find(|b| !legal.contains(*b)) {
            return Err(ConfigError::Invalid(format!(
                "{}: button {} is not available on the {}",
                context, button, kind
            )));
        }
        Ok(())
    }
}

/// Named sequence of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickAction {
    #[serde(skip, default = "Uuid::new_v4")]
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// How many times the steps are played back to back
    #[serde(default = "default_repeat")]
    pub repeat: u32,

    /// Idle time inserted after every step, 0 for none
    #[serde(default)]
    pub wait_between_steps_ms: u64,

    pub steps: Vec<ActionStep>,
}

impl QuickAction {
    pub fn new(name: impl Into<String>, steps: Vec<ActionStep>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            repeat: default_repeat(),
            wait_between_steps_ms: 0,
            steps,
        }
    }

    /// Walk a stick through all eight directions, starting at the bottom
    pub fn circle(side: StickSide) -> Self {
        let steps = StickDirection::CLOCKWISE
            .iter()
            .cycle()
            .skip(4)
            .take(StickDirection::CLOCKWISE.len())
            .map(|&direction| ActionStep::stick(side, direction, CIRCLE_STEP_MS))
            .collect();

        let side_name = match side {
            StickSide::Left => "left",
            StickSide::Right => "right",
        };
        Self {
            description: format!("Move the {} stick in a full circle", side_name),
            wait_between_steps_ms: CIRCLE_STEP_MS,
            ..Self::new("Move Stick in Circle", steps)
        }
    }

    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Steps as played back: repetitions unrolled, waits inserted
    pub fn expanded_steps(&self) -> Vec<ActionStep> {
        let wait = self.wait_between_steps_ms;
        (0..self.repeat)
            .flat_map(|_| self.steps.iter())
            .flat_map(|step| {
                let mut expanded = vec![step.clone()];
                if wait > 0 {
                    expanded.push(ActionStep::wait(wait));
                }
                expanded
            })
            .collect()
    }

    /// Total playback time
    pub fn total_duration(&self) -> Duration {
        self.expanded_steps().iter().map(ActionStep::duration).sum()
    }

    /// Check the action against a controller variant
    pub fn validate(&self, kind: ControllerKind) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("Quick action name must not be empty".into()));
        }
        if self.repeat == 0 {
            return Err(ConfigError::Invalid(format!(
                "Quick action '{}': repeat must be at least 1",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Quick action '{}' has no steps",
                self.name
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate(kind, &format!("Quick action '{}' step {}", self.name, i + 1))?;
        }
        Ok(())
    }
}
