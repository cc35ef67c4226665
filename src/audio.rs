//! External audio backend client.
//!
//! The overlay only ever reflects and forwards volume changes, so the
//! backend seam is a small synchronous trait. The shipped implementation
//! shells out to `pactl`; tests substitute a recording client.

use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::debug;

/// Device role. The overlay targets the default sink; sources only exist so
/// the resolve contract is honest about what it can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Sink,
    Source,
}

/// Snapshot of one audio device at populate time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    name: String,
    role: DeviceRole,
    volume: u8,
    muted: bool,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>, role: DeviceRole, volume: u8, muted: bool) -> Self {
        Self {
            name: name.into(),
            role,
            volume,
            muted,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }
}

/// Synchronous audio backend contract.
pub trait AudioClient {
    /// Refresh the device list from the backend.
    fn populate(&mut self) -> Result<()>;

    /// Name of the default device for the sink role.
    fn default_sink(&self) -> Result<String>;

    /// Look up a populated device by name and role.
    fn resolve(&self, name: &str, role: DeviceRole) -> Option<DeviceHandle>;

    /// Push a volume in `0..=100` to the device.
    fn set_volume(&mut self, device: &DeviceHandle, volume: u8) -> Result<()>;

    /// Push a mute flag to the device.
    fn set_mute(&mut self, device: &DeviceHandle, muted: bool) -> Result<()>;
}

/// `pactl`-backed client.
#[derive(Default)]
pub struct PactlClient {
    sinks: Vec<DeviceHandle>,
}

impl PactlClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioClient for PactlClient {
    fn populate(&mut self) -> Result<()> {
        let output = pactl(&["list", "sinks"])?;
        self.sinks = parse_sink_list(&output);
        debug!(sinks = self.sinks.len(), "populated audio devices");
        Ok(())
    }

    fn default_sink(&self) -> Result<String> {
        let output = pactl(&["get-default-sink"])?;
        let name = output.trim();
        if name.is_empty() {
            bail!("no default sink configured");
        }
        Ok(name.to_owned())
    }

    fn resolve(&self, name: &str, role: DeviceRole) -> Option<DeviceHandle> {
        if role != DeviceRole::Sink {
            return None;
        }
        self.sinks.iter().find(|sink| sink.name == name).cloned()
    }

    fn set_volume(&mut self, device: &DeviceHandle, volume: u8) -> Result<()> {
        pactl(&["set-sink-volume", device.name(), &format!("{volume}%")])?;
        if let Some(sink) = self.sinks.iter_mut().find(|s| s.name == device.name) {
            sink.volume = volume;
        }
        Ok(())
    }

    fn set_mute(&mut self, device: &DeviceHandle, muted: bool) -> Result<()> {
        pactl(&["set-sink-mute", device.name(), if muted { "1" } else { "0" }])?;
        if let Some(sink) = self.sinks.iter_mut().find(|s| s.name == device.name) {
            sink.muted = muted;
        }
        Ok(())
    }
}

fn pactl(args: &[&str]) -> Result<String> {
    let output = Command::new("pactl")
        .args(args)
        .output()
        .with_context(|| format!("failed to run pactl {}", args.join(" ")))?;
    if !output.status.success() {
        bail!("pactl {} exited with {}", args.join(" "), output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `pactl list sinks` output into device snapshots.
fn parse_sink_list(output: &str) -> Vec<DeviceHandle> {
    let mut sinks = Vec::new();
    let mut current: Option<DeviceHandle> = None;

    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("Sink #") {
            if let Some(sink) = current.take() {
                sinks.push(sink);
            }
            current = Some(DeviceHandle::new(String::new(), DeviceRole::Sink, 0, false));
        } else if let Some(rest) = trimmed.strip_prefix("Name: ") {
            if let Some(sink) = current.as_mut() {
                sink.name = rest.trim().to_owned();
            }
        } else if let Some(rest) = trimmed.strip_prefix("Mute: ") {
            if let Some(sink) = current.as_mut() {
                sink.muted = rest.trim() == "yes";
            }
        } else if let Some(rest) = trimmed.strip_prefix("Volume: ") {
            if let (Some(sink), Some(volume)) = (current.as_mut(), parse_volume_percent(rest)) {
                sink.volume = volume;
            }
        }
    }
    if let Some(sink) = current.take() {
        sinks.push(sink);
    }

    sinks.retain(|sink| !sink.name.is_empty());
    sinks
}

/// Extract the percentage from a pactl volume line, e.g.
/// `front-left: 42598 /  65% / -11.23 dB, ...`. Values above 100 (pactl
/// allows boosting) clamp to the contract range.
fn parse_volume_percent(line: &str) -> Option<u8> {
    let percent = line.split('/').nth(1)?.trim().strip_suffix('%')?.trim();
    percent.parse::<u16>().ok().map(|v| v.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Sink #0
\tState: RUNNING
\tName: alsa_output.pci-0000_00_1f.3.analog-stereo
\tDescription: Built-in Audio Analog Stereo
\tMute: no
\tVolume: front-left: 42598 /  65% / -11.23 dB,   front-right: 42598 /  65% / -11.23 dB
Sink #1
\tState: IDLE
\tName: bluez_output.AC_BF_71.a2dp-sink
\tMute: yes
\tVolume: front-left: 98304 / 150% / 10.57 dB,   front-right: 98304 / 150% / 10.57 dB
";

    #[test]
    fn parses_sink_list() {
        let sinks = parse_sink_list(SAMPLE);
        assert_eq!(sinks.len(), 2);

        assert_eq!(sinks[0].name(), "alsa_output.pci-0000_00_1f.3.analog-stereo");
        assert_eq!(sinks[0].volume(), 65);
        assert!(!sinks[0].muted());

        assert_eq!(sinks[1].name(), "bluez_output.AC_BF_71.a2dp-sink");
        // Boosted volumes clamp to the contract range.
        assert_eq!(sinks[1].volume(), 100);
        assert!(sinks[1].muted());
    }

    #[test]
    fn parses_volume_percent() {
        assert_eq!(
            parse_volume_percent("front-left: 42598 /  65% / -11.23 dB"),
            Some(65)
        );
        assert_eq!(parse_volume_percent("front-left: 0 /   0% / -inf dB"), Some(0));
        assert_eq!(parse_volume_percent("garbage"), None);
    }

    #[test]
    fn resolve_honors_role() {
        let mut client = PactlClient::new();
        client.sinks = parse_sink_list(SAMPLE);
        let name = "alsa_output.pci-0000_00_1f.3.analog-stereo";
        assert!(client.resolve(name, DeviceRole::Sink).is_some());
        assert!(client.resolve(name, DeviceRole::Source).is_none());
        assert!(client.resolve("missing", DeviceRole::Sink).is_none());
    }
}
