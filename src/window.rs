//! Overlay window creation with the root-window fallback path.
//!
//! The popup is first created as a child of the currently focused window,
//! which places it logically under the active application; some window
//! managers' stacking and focus semantics depend on that. Parents can reject
//! child creation (wrong class or attributes), so a rejected checked request
//! falls back to the root window, which always accepts.

use anyhow::{Context, Result};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, CreateWindowAux, EventMask, InputFocus, PropMode, Window,
    WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;

use crate::session::Session;

/// Creation-time size. Also the documented fallback for a failed geometry
/// query, which makes that failure indistinguishable from "no resize yet".
pub const DEFAULT_WIDTH: u16 = 40;
pub const DEFAULT_HEIGHT: u16 = 130;

const WINDOW_NAME: &[u8] = b"volosd";

pub struct OverlayWindow {
    id: Window,
    parent: Window,
    used_fallback: bool,
}

impl OverlayWindow {
    /// Create the popup against `parent`, falling back to the root window if
    /// the server rejects the checked request. The window is then named,
    /// mapped, and given input focus so key grabs behave predictably.
    pub fn create(
        session: &Session,
        parent: Window,
        width: u16,
        height: u16,
        event_mask: EventMask,
    ) -> Result<Self> {
        let (id, parent, used_fallback) =
            match Self::try_create(session, parent, width, height, event_mask) {
                Ok(id) => (id, parent, false),
                Err(err) => {
                    let root = session.screen().root;
                    warn!(
                        parent,
                        "parent rejected window creation, retrying against the root: {err:#}"
                    );
                    let id = Self::try_create(session, root, width, height, event_mask)
                        .context("window creation failed against the root window")?;
                    (id, root, true)
                }
            };

        let conn = session.conn();
        conn.change_property8(
            PropMode::REPLACE,
            id,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            WINDOW_NAME,
        )?;
        conn.map_window(id)?;
        conn.set_input_focus(InputFocus::PARENT, id, x11rb::CURRENT_TIME)?;
        debug!(id, parent, used_fallback, "overlay window created");

        Ok(Self {
            id,
            parent,
            used_fallback,
        })
    }

    fn try_create(
        session: &Session,
        parent: Window,
        width: u16,
        height: u16,
        event_mask: EventMask,
    ) -> Result<Window> {
        let conn = session.conn();
        let id = conn.generate_id()?;
        // override_redirect keeps the window manager away from the popup.
        let aux = CreateWindowAux::new()
            .override_redirect(1)
            .event_mask(event_mask);
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            id,
            parent,
            20,
            20,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            session.screen().root_visual,
            &aux,
        )?
        .check()?;
        Ok(id)
    }

    pub fn id(&self) -> Window {
        self.id
    }

    pub fn parent(&self) -> Window {
        self.parent
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// Live geometry from the server. The server owns the authoritative
    /// size; nothing is cached between paints.
    ///
    /// On failure returns the creation-time default and `false`; callers in
    /// the fallback path must treat that as "not yet confirmed".
    pub fn query_geometry(&self, session: &Session) -> ((u16, u16), bool) {
        let reply = session
            .conn()
            .get_geometry(self.id)
            .ok()
            .and_then(|cookie| cookie.reply().ok());
        match reply {
            Some(geometry) => ((geometry.width, geometry.height), true),
            None => ((DEFAULT_WIDTH, DEFAULT_HEIGHT), false),
        }
    }

    /// Explicit release. The server would reclaim the window at disconnect
    /// anyway; modeled so teardown is observable.
    pub fn release(self, session: &Session) {
        if let Err(err) = session.conn().destroy_window(self.id) {
            debug!(id = self.id, "failed to destroy overlay window: {err}");
        }
    }
}
