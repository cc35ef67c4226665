//! Volume state and the controller bridging input events to the backend.
//!
//! The controller owns the only mutable copy of `{volume, muted}`. Every
//! mutation is pushed to the audio device synchronously before the state is
//! committed; the caller repaints iff the state actually changed.

use anyhow::{Context, Result};
use tracing::debug;

use crate::audio::{AudioClient, DeviceHandle, DeviceRole};

pub const MAX_VOLUME: u8 = 100;

/// Clamp `current + delta` into `[0, MAX_VOLUME]`. Out-of-bound deltas are
/// truncated at the bound, never an error, never a wraparound.
pub fn clamp_volume(current: u8, delta: i32) -> u8 {
    (i32::from(current) + delta).clamp(0, i32::from(MAX_VOLUME)) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeState {
    pub volume: u8,
    pub muted: bool,
}

pub struct VolumeController<A: AudioClient> {
    audio: A,
    device: DeviceHandle,
    state: VolumeState,
}

impl<A: AudioClient> VolumeController<A> {
    /// Resolve the default sink and seed the state from it. An unresolvable
    /// device is fatal: there is nothing useful to overlay.
    pub fn new(mut audio: A) -> Result<Self> {
        audio.populate().context("failed to enumerate audio devices")?;
        let name = audio
            .default_sink()
            .context("failed to determine the default sink")?;
        let device = audio
            .resolve(&name, DeviceRole::Sink)
            .with_context(|| format!("audio device {name} not found"))?;

        let state = VolumeState {
            volume: device.volume(),
            muted: device.muted(),
        };
        debug!(device = device.name(), volume = state.volume, muted = state.muted, "seeded volume state");

        Ok(Self {
            audio,
            device,
            state,
        })
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    /// Apply a clamped volume delta. Returns whether the value changed (and
    /// therefore whether a repaint is due). A no-op at the bound touches
    /// neither the device nor the state.
    pub fn adjust(&mut self, delta: i32) -> Result<bool> {
        let next = clamp_volume(self.state.volume, delta);
        if next == self.state.volume {
            return Ok(false);
        }
        self.audio.set_volume(&self.device, next)?;
        self.state.volume = next;
        Ok(true)
    }

    /// Flip the mute flag. Always a change.
    pub fn toggle_mute(&mut self) -> Result<bool> {
        let next = !self.state.muted;
        self.audio.set_mute(&self.device, next)?;
        self.state.muted = next;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;

    #[derive(Default)]
    struct Calls {
        volumes: Vec<u8>,
        mutes: Vec<bool>,
    }

    struct MockAudio {
        device: DeviceHandle,
        calls: Rc<RefCell<Calls>>,
    }

    impl MockAudio {
        fn new(volume: u8, muted: bool) -> (Self, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            let device = DeviceHandle::new("mock-sink", DeviceRole::Sink, volume, muted);
            (
                Self {
                    device,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl AudioClient for MockAudio {
        fn populate(&mut self) -> Result<()> {
            Ok(())
        }

        fn default_sink(&self) -> Result<String> {
            Ok(self.device.name().to_owned())
        }

        fn resolve(&self, name: &str, role: DeviceRole) -> Option<DeviceHandle> {
            (name == self.device.name() && role == DeviceRole::Sink).then(|| self.device.clone())
        }

        fn set_volume(&mut self, _device: &DeviceHandle, volume: u8) -> Result<()> {
            self.calls.borrow_mut().volumes.push(volume);
            Ok(())
        }

        fn set_mute(&mut self, _device: &DeviceHandle, muted: bool) -> Result<()> {
            self.calls.borrow_mut().mutes.push(muted);
            Ok(())
        }
    }

    fn controller(volume: u8, muted: bool) -> (VolumeController<MockAudio>, Rc<RefCell<Calls>>) {
        let (audio, calls) = MockAudio::new(volume, muted);
        (VolumeController::new(audio).unwrap(), calls)
    }

    #[test]
    fn seeds_state_from_device() {
        let (ctl, _) = controller(42, true);
        assert_eq!(
            ctl.state(),
            VolumeState {
                volume: 42,
                muted: true
            }
        );
    }

    #[test]
    fn adjust_pushes_then_commits() {
        let (mut ctl, calls) = controller(50, false);
        assert!(ctl.adjust(1).unwrap());
        assert!(ctl.adjust(-2).unwrap());
        assert_eq!(ctl.state().volume, 49);
        assert_eq!(calls.borrow().volumes, vec![51, 49]);
    }

    #[test]
    fn adjust_at_bound_is_silent_noop() {
        let (mut ctl, calls) = controller(100, false);
        assert!(!ctl.adjust(1).unwrap());
        assert_eq!(ctl.state().volume, 100);
        // No device call, no repaint.
        assert!(calls.borrow().volumes.is_empty());
    }

    #[test]
    fn adjust_truncates_partial_overshoot() {
        let (mut ctl, calls) = controller(95, false);
        assert!(ctl.adjust(10).unwrap());
        assert_eq!(ctl.state().volume, 100);
        assert_eq!(calls.borrow().volumes, vec![100]);
    }

    #[test]
    fn toggle_mute_is_its_own_inverse() {
        let (mut ctl, calls) = controller(50, false);
        assert!(ctl.toggle_mute().unwrap());
        assert!(ctl.state().muted);
        assert!(ctl.toggle_mute().unwrap());
        assert!(!ctl.state().muted);
        assert_eq!(calls.borrow().mutes, vec![true, false]);
    }

    proptest! {
        #[test]
        fn clamp_stays_in_bounds(start in 0u8..=100, delta in -500i32..=500) {
            let clamped = clamp_volume(start, delta);
            prop_assert!(clamped <= MAX_VOLUME);
        }

        #[test]
        fn saturating_round_trip_lands_on_zero(start in 0u8..=100) {
            let up = clamp_volume(start, 200);
            prop_assert_eq!(up, 100);
            prop_assert_eq!(clamp_volume(up, -200), 0);
        }
    }
}
