//! Page view state and the stale-render guard
//!
//! Page renders complete out of band. Each request bumps a generation
//! counter and returns a [`RenderTicket`] capturing the requested page and
//! generation; a result is accepted only if both still match on arrival.

use serde::Serialize;

/// Handle for one in-flight page render
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderTicket {
    pub page: u32,
    pub scale: f32,
    pub generation: u64,
}

/// Navigation state owned by the host; the engine only reads it
#[derive(Debug, Clone)]
pub struct PageView {
    current_page: u32,
    scale: f32,
    generation: u64,
    pending: Option<RenderTicket>,
}

impl Default for PageView {
    fn default() -> Self {
        Self {
            current_page: 0,
            scale: 1.0,
            generation: 0,
            pending: None,
        }
    }
}

impl PageView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending(&self) -> Option<RenderTicket> {
        self.pending
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a navigation or zoom request
    ///
    /// Any earlier ticket becomes stale.
    pub fn begin_load(&mut self, page: u32, scale: f32) -> RenderTicket {
        self.generation += 1;
        self.current_page = page;
        self.scale = scale;
        let ticket = RenderTicket {
            page,
            scale,
            generation: self.generation,
        };
        self.pending = Some(ticket);
        ticket
    }

    /// Settle `ticket`, returning whether its result may be presented
    pub fn accept(&mut self, ticket: &RenderTicket) -> bool {
        let current = self.pending.as_ref().is_some_and(|pending| {
            pending.generation == ticket.generation && pending.page == ticket.page
        });
        if current {
            self.pending = None;
        }
        current
    }

    /// Keep a navigation target inside `[0, page_count)`
    pub fn clamp_page(page: i64, page_count: u32) -> Option<u32> {
        if page_count == 0 {
            return None;
        }
        Some(page.clamp(0, i64::from(page_count) - 1) as u32)
    }
}
