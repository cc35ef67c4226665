//! X11 session: connection, screen metadata, atom cache, symbol table.
//!
//! One session per process. The atom cache is populated once at construction
//! and read-only afterwards; the server releases every resource allocated
//! through the connection when it is dropped at process exit.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, ChangeWindowAttributesAux, Colormap, ConnectionExt as _, EventMask, GrabMode, ModMask,
    Visualid, Window,
};
use x11rb::rust_connection::RustConnection;

use crate::input::KeyboardMap;

/// Atoms interned at startup. Lookup failure here aborts startup.
pub const STARTUP_ATOMS: [&str; 3] = [WINDOW_STATE, WINDOW_NAME, ACTIVE_WINDOW];

pub const WINDOW_STATE: &str = "WM_STATE";
pub const WINDOW_NAME: &str = "WM_NAME";
/// Property the window manager updates when the active window changes.
pub const ACTIVE_WINDOW: &str = "_NET_ACTIVE_WINDOW";

/// Read-only screen facts captured at connect time.
pub struct ScreenInfo {
    pub root: Window,
    pub root_visual: Visualid,
    pub default_colormap: Colormap,
    pub root_depth: u8,
}

pub struct Session {
    conn: RustConnection,
    screen: ScreenInfo,
    atoms: HashMap<String, Atom>,
    keymap: KeyboardMap,
}

impl Session {
    /// Connect to the display server and populate the caches.
    ///
    /// There is no retry: the overlay has no meaning without a display.
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) =
            x11rb::connect(None).context("failed to connect to the X server")?;

        let screen = &conn.setup().roots[screen_num];
        let screen = ScreenInfo {
            root: screen.root,
            root_visual: screen.root_visual,
            default_colormap: screen.default_colormap,
            root_depth: screen.root_depth,
        };

        let keymap = KeyboardMap::new(&conn)?;

        let mut session = Self {
            conn,
            screen,
            atoms: HashMap::new(),
            keymap,
        };
        for name in STARTUP_ATOMS {
            let atom = session
                .intern_atom(name)
                .with_context(|| format!("failed to intern startup atom {name}"))?;
            session.atoms.insert(name.to_owned(), atom);
        }
        debug!(atoms = session.atoms.len(), "session established");

        Ok(session)
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn screen(&self) -> &ScreenInfo {
        &self.screen
    }

    pub fn keymap(&self) -> &KeyboardMap {
        &self.keymap
    }

    /// Round-trip atom lookup.
    ///
    /// A missing reply is a recoverable error; the caller decides whether it
    /// is fatal. During startup cache population it is; during the in-loop
    /// focus-loss check the cached value stands in.
    pub fn intern_atom(&self, name: &str) -> Result<Atom> {
        let reply = self
            .conn
            .intern_atom(false, name.as_bytes())
            .with_context(|| format!("failed to request atom {name}"))?
            .reply()
            .with_context(|| format!("no reply interning atom {name}"))?;
        Ok(reply.atom)
    }

    /// Atom from the startup cache.
    pub fn cached_atom(&self, name: &str) -> Option<Atom> {
        self.atoms.get(name).copied()
    }

    /// Grab a key on the root window, asynchronously for both pointer and
    /// keyboard, so the binding fires even while other clients keep running
    /// and the overlay itself never holds focus.
    ///
    /// An unresolvable keysym skips the grab: partial key coverage is an
    /// acceptable degraded mode.
    pub fn grab_key(&self, modifiers: ModMask, keysym: u32) -> Result<()> {
        let Some(keycode) = self.keymap.keycode_for(keysym) else {
            warn!("no keycode for keysym {keysym:#x}, skipping grab");
            return Ok(());
        };
        self.conn
            .grab_key(
                false,
                self.screen.root,
                modifiers,
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .with_context(|| format!("failed to send key grab for keysym {keysym:#x}"))?;
        Ok(())
    }

    /// The window currently holding input focus.
    pub fn input_focus(&self) -> Result<Window> {
        let reply = self
            .conn
            .get_input_focus()
            .context("failed to request the input focus")?
            .reply()
            .context("input focus request returned no reply")?;
        Ok(reply.focus)
    }

    /// Subscribe to property changes on the root window, where the window
    /// manager announces active-window changes.
    pub fn watch_root_properties(&self) -> Result<()> {
        self.conn
            .change_window_attributes(
                self.screen.root,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
            )
            .context("failed to change root window attributes")?
            .check()
            .context("root window rejected the property-change subscription")?;
        Ok(())
    }
}
