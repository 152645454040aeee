use crate::core::input::{Action, Lane};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use log::info;

#[inline(always)]
const fn deadzone() -> f32 {
    0.35
}

/// The parts of a gilrs event this game cares about.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PadInput {
    Button { button: Button, pressed: bool },
    Axis { axis: Axis, value: f32 },
    Disconnected,
}

/// D-pad and left stick merged into four lane flags, so a lane only emits
/// an edge when the combined state changes.
#[derive(Default, Clone, Copy, Debug)]
pub struct GamepadState {
    lanes: [bool; 4],
    dpad: [bool; 4],
    lx: f32,
    ly: f32,
}

fn dpad_lane(button: Button) -> Option<Lane> {
    match button {
        Button::DPadLeft => Some(Lane::Left),
        Button::DPadDown => Some(Lane::Down),
        Button::DPadUp => Some(Lane::Up),
        Button::DPadRight => Some(Lane::Right),
        _ => None,
    }
}

impl GamepadState {
    pub fn lane_down(&self, lane: Lane) -> bool {
        self.lanes[lane.index()]
    }

    pub fn translate(&mut self, input: PadInput) -> Vec<Action> {
        let mut out = Vec::new();
        match input {
            PadInput::Disconnected => {
                for lane in Lane::ALL.into_iter().filter(|l| self.lanes[l.index()]) {
                    out.push(Action::Lane {
                        lane,
                        pressed: false,
                    });
                }
                *self = GamepadState::default();
                return out;
            }
            PadInput::Button { button, pressed } => {
                if let Some(lane) = dpad_lane(button) {
                    self.dpad[lane.index()] = pressed;
                } else if pressed {
                    match button {
                        Button::Start => out.push(Action::TogglePause),
                        Button::South => out.push(Action::Start),
                        Button::Select => out.push(Action::Back),
                        _ => {}
                    }
                }
            }
            PadInput::Axis { axis, value } => match axis {
                Axis::LeftStickX => self.lx = value,
                Axis::LeftStickY => self.ly = value,
                _ => {}
            },
        }

        let dz = deadzone();
        // gilrs reports stick-up as positive Y
        let stick = [self.lx <= -dz, self.ly <= -dz, self.ly >= dz, self.lx >= dz];
        for lane in Lane::ALL {
            let i = lane.index();
            let want = self.dpad[i] || stick[i];
            if want != self.lanes[i] {
                self.lanes[i] = want;
                out.push(Action::Lane {
                    lane,
                    pressed: want,
                });
            }
        }
        out
    }
}

/// Poll gilrs, keep a single active pad, and output game actions.
pub fn poll_and_collect(
    gilrs: &mut Gilrs,
    active_id: &mut Option<GamepadId>,
    state: &mut GamepadState,
) -> Vec<Action> {
    let mut out = Vec::new();
    while let Some(Event { id, event, .. }) = gilrs.next_event() {
        if active_id.is_none() {
            info!("Using gamepad {}.", gilrs.gamepad(id).name());
            *active_id = Some(id);
        }
        if Some(id) != *active_id {
            continue;
        }
        let input = match event {
            EventType::ButtonPressed(button, _) => PadInput::Button {
                button,
                pressed: true,
            },
            EventType::ButtonReleased(button, _) => PadInput::Button {
                button,
                pressed: false,
            },
            EventType::AxisChanged(axis, value, _) => PadInput::Axis { axis, value },
            EventType::Disconnected => {
                info!("Gamepad disconnected.");
                *active_id = None;
                PadInput::Disconnected
            }
            _ => continue,
        };
        out.extend(state.translate(input));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(button: Button, pressed: bool) -> PadInput {
        PadInput::Button { button, pressed }
    }

    #[test]
    fn dpad_maps_to_lanes() {
        let mut pad = GamepadState::default();
        assert_eq!(
            pad.translate(press(Button::DPadUp, true)),
            vec![Action::Lane {
                lane: Lane::Up,
                pressed: true
            }]
        );
        assert!(pad.lane_down(Lane::Up));
        assert_eq!(
            pad.translate(press(Button::DPadUp, false)),
            vec![Action::Lane {
                lane: Lane::Up,
                pressed: false
            }]
        );
    }

    #[test]
    fn stick_and_dpad_share_a_lane() {
        let mut pad = GamepadState::default();
        pad.translate(press(Button::DPadLeft, true));
        let events = pad.translate(PadInput::Axis {
            axis: Axis::LeftStickX,
            value: -0.9,
        });
        assert!(events.is_empty());
        // still held by the stick
        assert!(pad.translate(press(Button::DPadLeft, false)).is_empty());
        assert_eq!(
            pad.translate(PadInput::Axis {
                axis: Axis::LeftStickX,
                value: 0.0
            }),
            vec![Action::Lane {
                lane: Lane::Left,
                pressed: false
            }]
        );
    }

    #[test]
    fn menu_buttons() {
        let mut pad = GamepadState::default();
        assert_eq!(pad.translate(press(Button::Start, true)), vec![Action::TogglePause]);
        assert!(pad.translate(press(Button::Start, false)).is_empty());
        assert_eq!(pad.translate(press(Button::South, true)), vec![Action::Start]);
        assert_eq!(pad.translate(press(Button::Select, true)), vec![Action::Back]);
    }

    #[test]
    fn disconnect_releases_held_lanes() {
        let mut pad = GamepadState::default();
        pad.translate(press(Button::DPadDown, true));
        pad.translate(press(Button::DPadRight, true));
        assert_eq!(
            pad.translate(PadInput::Disconnected),
            vec![
                Action::Lane {
                    lane: Lane::Down,
                    pressed: false
                },
                Action::Lane {
                    lane: Lane::Right,
                    pressed: false
                },
            ]
        );
        assert!(!pad.lane_down(Lane::Down));
    }
}
