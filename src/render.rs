//! Off-screen render buffer and volume-bar painting.
//!
//! Painting goes pixmap-first, then a copy to the visible window, so a
//! redraw never tears. The pixmap is deliberately oversized (1024×1024)
//! relative to any expected window: geometry queries returning larger sizes
//! only change the blit region, never force a reallocation.

use anyhow::{Context, Result};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ConnectionExt as _, CreateGCAux, Drawable, Gcontext, Pixmap, Rectangle, Window,
};

use crate::session::Session;

/// Fixed backing size of the off-screen pixmap.
pub const BUFFER_SIZE: u16 = 1024;

const COLOR_ACTIVE: (u8, u8, u8) = (0xa6, 0xe2, 0x2e);
const COLOR_MUTED: (u8, u8, u8) = (0xff, 0x45, 0x35);
const COLOR_BACKGROUND: (u8, u8, u8) = (0x38, 0x38, 0x30);

/// RGB8→RGB16 expansion used for colormap allocation.
pub fn rgb8_to_16(v: u8) -> u16 {
    (65535 * u32::from(v) / 255) as u16
}

/// Foreground bar for a volume level, bottom-anchored in the queried window
/// geometry. Height is `round(height * volume / 100)`.
pub fn bar_geometry(width: u16, height: u16, volume: u8) -> Rectangle {
    let bar = (f64::from(height) * f64::from(volume) / 100.0).round() as u16;
    Rectangle {
        x: 0,
        y: (height - bar) as i16,
        width,
        height: bar,
    }
}

/// The graphics context to fill the bar with: muted color iff muted.
pub fn select_gc(active: Gcontext, muted_gc: Gcontext, muted: bool) -> Gcontext {
    if muted {
        muted_gc
    } else {
        active
    }
}

pub struct RenderBuffer {
    pixmap: Pixmap,
    window: Window,
    background: Gcontext,
    active: Gcontext,
    muted: Gcontext,
}

impl RenderBuffer {
    /// Allocate the pixmap and the three graphics contexts. Colors are
    /// resolved once for the process lifetime; a failed allocation is fatal
    /// since there is no usable palette without it.
    pub fn new(session: &Session, window: Window) -> Result<Self> {
        let active = alloc_gc(session, window, COLOR_ACTIVE)?;
        let muted = alloc_gc(session, window, COLOR_MUTED)?;
        let background = alloc_gc(session, window, COLOR_BACKGROUND)?;

        let conn = session.conn();
        let pixmap = conn.generate_id()?;
        conn.create_pixmap(
            session.screen().root_depth,
            pixmap,
            window,
            BUFFER_SIZE,
            BUFFER_SIZE,
        )
        .context("failed to create the render pixmap")?;

        Ok(Self {
            pixmap,
            window,
            background,
            active,
            muted,
        })
    }

    /// Fill background then foreground into the buffer, flush, and blit the
    /// painted region onto the window. Both rectangles follow the queried
    /// window geometry, not the fixed buffer size.
    pub fn paint(
        &self,
        session: &Session,
        volume: u8,
        muted: bool,
        (width, height): (u16, u16),
    ) -> Result<()> {
        let conn = session.conn();
        let background = Rectangle {
            x: 0,
            y: 0,
            width,
            height,
        };
        conn.poly_fill_rectangle(self.pixmap, self.background, &[background])?;

        let bar = bar_geometry(width, height, volume);
        let gc = select_gc(self.active, self.muted, muted);
        conn.poly_fill_rectangle(self.pixmap, gc, &[bar])?;
        conn.flush()?;

        conn.copy_area(self.pixmap, self.window, gc, 0, 0, 0, 0, width, height)?;
        conn.flush()?;
        Ok(())
    }

    /// Copy a damaged rectangle from the buffer onto the window (Expose
    /// handling).
    pub fn blit_region(&self, session: &Session, x: i16, y: i16, width: u16, height: u16) -> Result<()> {
        let conn = session.conn();
        conn.copy_area(self.pixmap, self.window, self.active, x, y, x, y, width, height)?;
        conn.flush()?;
        Ok(())
    }

    /// Explicit release of the server-side resources; optional, since the
    /// server reclaims them at disconnect.
    pub fn release(self, session: &Session) {
        let conn = session.conn();
        let drawable: Drawable = self.pixmap;
        if let Err(err) = conn.free_pixmap(self.pixmap) {
            debug!(drawable, "failed to free pixmap: {err}");
        }
        for gc in [self.background, self.active, self.muted] {
            if let Err(err) = conn.free_gc(gc) {
                debug!(gc, "failed to free graphics context: {err}");
            }
        }
    }
}

fn alloc_gc(session: &Session, drawable: Drawable, (r, g, b): (u8, u8, u8)) -> Result<Gcontext> {
    let conn = session.conn();
    let reply = conn
        .alloc_color(
            session.screen().default_colormap,
            rgb8_to_16(r),
            rgb8_to_16(g),
            rgb8_to_16(b),
        )
        .context("failed to request a color allocation")?
        .reply()
        .with_context(|| format!("color allocation failed for #{r:02x}{g:02x}{b:02x}"))?;

    let gc = conn.generate_id()?;
    conn.create_gc(
        gc,
        drawable,
        &CreateGCAux::new()
            .foreground(reply.pixel)
            .graphics_exposures(0),
    )
    .context("failed to create a graphics context")?;
    Ok(gc)
}
