//! End-to-end volume controller behavior against a recording audio backend.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{bail, Result};
use volosd::audio::{AudioClient, DeviceHandle, DeviceRole};
use volosd::volume::VolumeController;

#[derive(Default)]
struct Log {
    volumes: Vec<u8>,
    mutes: Vec<bool>,
}

/// Backend double that records every push and can simulate a missing device.
struct RecordingClient {
    device: Option<DeviceHandle>,
    log: Rc<RefCell<Log>>,
}

impl RecordingClient {
    fn with_device(volume: u8, muted: bool) -> (Self, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let client = Self {
            device: Some(DeviceHandle::new("test-sink", DeviceRole::Sink, volume, muted)),
            log: log.clone(),
        };
        (client, log)
    }

    fn without_device() -> Self {
        Self {
            device: None,
            log: Rc::new(RefCell::new(Log::default())),
        }
    }
}

impl AudioClient for RecordingClient {
    fn populate(&mut self) -> Result<()> {
        Ok(())
    }

    fn default_sink(&self) -> Result<String> {
        match &self.device {
            Some(device) => Ok(device.name().to_owned()),
            None => bail!("no default sink configured"),
        }
    }

    fn resolve(&self, name: &str, role: DeviceRole) -> Option<DeviceHandle> {
        self.device
            .as_ref()
            .filter(|device| device.name() == name && role == DeviceRole::Sink)
            .cloned()
    }

    fn set_volume(&mut self, _device: &DeviceHandle, volume: u8) -> Result<()> {
        self.log.borrow_mut().volumes.push(volume);
        Ok(())
    }

    fn set_mute(&mut self, _device: &DeviceHandle, muted: bool) -> Result<()> {
        self.log.borrow_mut().mutes.push(muted);
        Ok(())
    }
}

#[test]
fn ten_increments_from_fifty() {
    let (client, log) = RecordingClient::with_device(50, false);
    let mut controller = VolumeController::new(client).unwrap();

    let mut repaints = 0;
    for _ in 0..10 {
        if controller.adjust(1).unwrap() {
            repaints += 1;
        }
    }

    assert_eq!(controller.state().volume, 60);
    // The device saw every intermediate value, in order, and each change
    // triggered exactly one repaint.
    assert_eq!(log.borrow().volumes, (51..=60).collect::<Vec<u8>>());
    assert_eq!(repaints, 10);
}

#[test]
fn saturating_sweep_lands_on_the_bounds() {
    let (client, log) = RecordingClient::with_device(30, false);
    let mut controller = VolumeController::new(client).unwrap();

    assert!(controller.adjust(200).unwrap());
    assert_eq!(controller.state().volume, 100);
    assert!(controller.adjust(-200).unwrap());
    assert_eq!(controller.state().volume, 0);

    // Only the clamped values reached the device.
    assert_eq!(log.borrow().volumes, vec![100, 0]);

    // Pinned at a bound, further pushes are silent no-ops.
    assert!(!controller.adjust(-1).unwrap());
    assert_eq!(log.borrow().volumes.len(), 2);
}

#[test]
fn mute_round_trip_restores_state() {
    let (client, log) = RecordingClient::with_device(70, true);
    let mut controller = VolumeController::new(client).unwrap();

    assert!(controller.state().muted);
    controller.toggle_mute().unwrap();
    controller.toggle_mute().unwrap();
    assert!(controller.state().muted);
    assert_eq!(log.borrow().mutes, vec![false, true]);
}

#[test]
fn missing_device_fails_startup() {
    let err = VolumeController::new(RecordingClient::without_device())
        .err()
        .expect("startup must fail without a resolvable device");
    assert!(format!("{err:#}").contains("default sink"));
}
