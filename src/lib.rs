//! volosd - transient X11 volume OSD
//!
//! Overlay lifecycle and event-dispatch core: one X11 session, a
//! borrowed-parent popup window with a root fallback, an off-screen render
//! buffer, and a blocking event loop that runs until a quit key or until
//! input focus moves to another window.

pub mod audio;
pub mod input;
pub mod render;
pub mod session;
pub mod volume;
pub mod window;

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{EventMask, Keycode, PropertyNotifyEvent, Window};
use x11rb::protocol::Event;

use crate::audio::AudioClient;
use crate::input::KeyAction;
use crate::render::RenderBuffer;
use crate::session::Session;
use crate::volume::VolumeController;
use crate::window::OverlayWindow;

/// Bounded retry for geometry settlement after a fallback creation. Never
/// an unbounded wait: after the last attempt the best-known geometry wins.
const GEOMETRY_POLL_ATTEMPTS: u32 = 10;
const GEOMETRY_POLL_DELAY: Duration = Duration::from_millis(50);

/// Loop states. EXITING is terminal; it is checked at the top of every
/// iteration, so no dispatch arm needs non-local control flow to reach
/// teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Exiting,
}

/// Focus-loss rule: the loop exits iff the newly focused window is not the
/// overlay itself. A spurious notification naming the overlay keeps running.
pub fn focus_transition(focused: Window, overlay: Window) -> LoopState {
    if focused == overlay {
        LoopState::Running
    } else {
        LoopState::Exiting
    }
}

/// The overlay context: one of everything, constructed at startup and
/// passed by reference everywhere. No ambient globals.
pub struct Osd<A: AudioClient> {
    session: Session,
    window: OverlayWindow,
    buffer: RenderBuffer,
    controller: VolumeController<A>,
    state: LoopState,
}

impl<A: AudioClient> Osd<A> {
    /// Bring up the whole overlay: session, popup window (with fallback),
    /// render buffer, root-window subscriptions and key grabs, and the
    /// volume state seeded from the audio backend.
    pub fn bootstrap(audio: A) -> Result<Self> {
        let session = Session::connect()?;

        let parent = session
            .input_focus()
            .context("failed to query the focused window")?;

        let event_mask = EventMask::EXPOSURE
            | EventMask::KEY_PRESS
            | EventMask::KEY_RELEASE
            | EventMask::BUTTON_PRESS
            | EventMask::FOCUS_CHANGE
            | EventMask::PROPERTY_CHANGE
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW;
        let window = OverlayWindow::create(
            &session,
            parent,
            window::DEFAULT_WIDTH,
            window::DEFAULT_HEIGHT,
            event_mask,
        )?;

        let buffer = RenderBuffer::new(&session, window.id())?;

        session.watch_root_properties()?;
        for (modifiers, keysym) in input::key_grabs() {
            session.grab_key(modifiers, keysym)?;
        }
        session.conn().flush()?;

        let controller = VolumeController::new(audio)?;

        Ok(Self {
            session,
            window,
            buffer,
            controller,
            state: LoopState::Running,
        })
    }

    /// One-time paint, then the blocking dispatch loop, then teardown.
    pub fn run(mut self) -> Result<()> {
        // INIT: when the window was reparented to the root the window
        // manager may still be settling its geometry; wait it out, bounded.
        let geometry = if self.window.used_fallback() {
            self.settle_geometry()
        } else {
            self.window.query_geometry(&self.session).0
        };
        let state = self.controller.state();
        self.buffer
            .paint(&self.session, state.volume, state.muted, geometry)
            .context("initial paint failed")?;

        while self.state == LoopState::Running {
            let event = match self.session.conn().wait_for_event() {
                Ok(event) => event,
                Err(err) => {
                    warn!("connection lost while waiting for events: {err}");
                    break;
                }
            };
            self.dispatch(event);
        }

        info!("exiting");
        self.shutdown();
        Ok(())
    }

    /// Bounded geometry poll: short sleeps interleaved with non-blocking
    /// flushes until a query succeeds, proceeding best-effort at the bound.
    fn settle_geometry(&self) -> (u16, u16) {
        let mut geometry = (window::DEFAULT_WIDTH, window::DEFAULT_HEIGHT);
        for attempt in 0..GEOMETRY_POLL_ATTEMPTS {
            let (size, confirmed) = self.window.query_geometry(&self.session);
            if confirmed {
                debug!(attempt, width = size.0, height = size.1, "geometry confirmed");
                return size;
            }
            geometry = size;
            let _ = self.session.conn().flush();
            thread::sleep(GEOMETRY_POLL_DELAY);
        }
        debug!("geometry never confirmed, proceeding with best-effort size");
        geometry
    }

    /// Classify and handle one event. In-loop failures are handled here and
    /// never propagate past the loop.
    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Error(err) => {
                // Protocol errors are logged, never fatal.
                warn!(
                    error_code = err.error_code,
                    sequence = err.sequence,
                    bad_value = err.bad_value,
                    "X protocol error"
                );
            }
            Event::Expose(e) => {
                if let Err(err) = self.buffer.blit_region(
                    &self.session,
                    e.x as i16,
                    e.y as i16,
                    e.width,
                    e.height,
                ) {
                    warn!("failed to blit exposed region: {err:#}");
                }
            }
            Event::FocusIn(e) => debug!(window = e.event, "focus gained"),
            Event::FocusOut(e) => debug!(window = e.event, "focus lost"),
            Event::PropertyNotify(e) => self.on_property_notify(e),
            Event::KeyPress(e) => self.on_key_press(e.detail),
            Event::KeyRelease(e) => trace!(keycode = e.detail, "key release"),
            Event::ButtonPress(_) => {
                // Legacy shortcut: any button press bumps the volume.
                self.change_volume(1);
            }
            Event::ConfigureNotify(_) | Event::MapNotify(_) | Event::ReparentNotify(_) => {
                debug!("window structure notification");
            }
            other => debug!(event = ?other, "unhandled event"),
        }
    }

    /// A property change on the active-window atom means the window manager
    /// switched focus; exit unless the overlay itself is the new focus.
    fn on_property_notify(&mut self, event: PropertyNotifyEvent) {
        let active = match self.session.intern_atom(session::ACTIVE_WINDOW) {
            Ok(atom) => atom,
            Err(err) => {
                // Tolerated: the atom cannot have changed identity, so the
                // cached value stands in.
                debug!("atom lookup failed, using cached value: {err:#}");
                match self.session.cached_atom(session::ACTIVE_WINDOW) {
                    Some(atom) => atom,
                    None => return,
                }
            }
        };
        if event.atom != active {
            trace!(atom = event.atom, "property change on untracked atom");
            return;
        }

        match self.session.input_focus() {
            Ok(focused) => {
                self.state = focus_transition(focused, self.window.id());
                if self.state == LoopState::Exiting {
                    info!(focused, "focus moved away");
                }
            }
            Err(err) => warn!("failed to re-query focus: {err:#}"),
        }
    }

    fn on_key_press(&mut self, keycode: Keycode) {
        let Some(keysym) = self.session.keymap().unshifted_keysym(keycode) else {
            debug!(keycode, "key press with no keysym");
            return;
        };
        match input::action_for_keysym(keysym) {
            Some(KeyAction::VolumeDown) => self.change_volume(-1),
            Some(KeyAction::VolumeUp) => self.change_volume(1),
            Some(KeyAction::ToggleMute) => match self.controller.toggle_mute() {
                Ok(_) => self.repaint(),
                Err(err) => warn!("audio backend rejected mute toggle: {err:#}"),
            },
            Some(KeyAction::Quit) => {
                info!("quit key pressed");
                self.state = LoopState::Exiting;
            }
            None => debug!("unbound key {keysym:#x}"),
        }
    }

    fn change_volume(&mut self, delta: i32) {
        match self.controller.adjust(delta) {
            Ok(true) => self.repaint(),
            Ok(false) => {}
            Err(err) => warn!("audio backend rejected volume change: {err:#}"),
        }
    }

    /// Repaint against freshly queried geometry; the server owns the
    /// authoritative size.
    fn repaint(&mut self) {
        let (geometry, confirmed) = self.window.query_geometry(&self.session);
        if !confirmed {
            debug!("geometry query failed, painting at the default size");
        }
        let state = self.controller.state();
        if let Err(err) = self
            .buffer
            .paint(&self.session, state.volume, state.muted, geometry)
        {
            warn!("repaint failed: {err:#}");
        }
    }

    /// Explicit release of server resources. Optional (the server reclaims
    /// everything at disconnect) but modeled so teardown is observable.
    fn shutdown(self) {
        self.buffer.release(&self.session);
        self.window.release(&self.session);
        let _ = self.session.conn().flush();
    }
}
