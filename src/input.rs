//! Keyboard symbol table and the fixed key bindings.
//!
//! The server's keyboard mapping is fetched once at session setup and used
//! read-only afterwards: keysym→keycode resolution when grabbing keys on the
//! root window, and keycode→keysym decoding when dispatching key presses.
//! Decoding always uses the unshifted column, so bindings fire regardless of
//! modifier state.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, Keycode, ModMask};

/// Keysyms for the fixed bindings (X11 keysymdef values).
pub mod keysym {
    pub const J: u32 = 0x6a;
    pub const K: u32 = 0x6b;
    pub const M: u32 = 0x6d;
    pub const Q: u32 = 0x71;
    pub const ESCAPE: u32 = 0xff1b;
}

/// Snapshot of the server's keycode→keysym table.
pub struct KeyboardMap {
    keysyms: Vec<u32>,
    keysyms_per_keycode: u8,
    min_keycode: Keycode,
}

impl KeyboardMap {
    /// Fetch the full keyboard mapping from the server.
    pub fn new(conn: &impl Connection) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - min_keycode + 1;

        let reply = conn
            .get_keyboard_mapping(min_keycode, count)
            .context("failed to request the keyboard mapping")?
            .reply()
            .context("keyboard mapping request returned no reply")?;

        Ok(Self::from_parts(
            reply.keysyms,
            reply.keysyms_per_keycode,
            min_keycode,
        ))
    }

    /// Build a map from raw parts. Used by `new` and by tests.
    pub fn from_parts(keysyms: Vec<u32>, keysyms_per_keycode: u8, min_keycode: Keycode) -> Self {
        Self {
            keysyms,
            keysyms_per_keycode,
            min_keycode,
        }
    }

    /// Resolve a keysym to the first keycode producing it in any column.
    pub fn keycode_for(&self, keysym: u32) -> Option<Keycode> {
        let per = self.keysyms_per_keycode as usize;
        if per == 0 {
            return None;
        }
        self.keysyms
            .chunks(per)
            .position(|chunk| chunk.contains(&keysym))
            .map(|i| self.min_keycode + i as u8)
    }

    /// The unshifted (column 0) keysym for a keycode, if any.
    pub fn unshifted_keysym(&self, keycode: Keycode) -> Option<u32> {
        if keycode < self.min_keycode {
            return None;
        }
        let idx = (keycode - self.min_keycode) as usize * self.keysyms_per_keycode as usize;
        match self.keysyms.get(idx).copied() {
            Some(0) | None => None,
            some => some,
        }
    }
}

/// Actions reachable from the grabbed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    VolumeDown,
    VolumeUp,
    ToggleMute,
    Quit,
}

/// The fixed keymap: j/k adjust volume, m toggles mute, q and Escape quit.
pub fn action_for_keysym(keysym: u32) -> Option<KeyAction> {
    match keysym {
        keysym::J => Some(KeyAction::VolumeDown),
        keysym::K => Some(KeyAction::VolumeUp),
        keysym::M => Some(KeyAction::ToggleMute),
        keysym::Q | keysym::ESCAPE => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Grabs requested on the root window at startup.
///
/// The quit pair is additionally grabbed with Control held so it still fires
/// under a control-like modifier.
pub fn key_grabs() -> Vec<(ModMask, u32)> {
    vec![
        (ModMask::from(0u16), keysym::J),
        (ModMask::from(0u16), keysym::K),
        (ModMask::from(0u16), keysym::M),
        (ModMask::from(0u16), keysym::Q),
        (ModMask::from(0u16), keysym::ESCAPE),
        (ModMask::CONTROL, keysym::Q),
        (ModMask::CONTROL, keysym::ESCAPE),
    ]
}
