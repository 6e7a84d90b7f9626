//! A map surface that draws to the terminal.
//!
//! The surface records what is on screen in a shared [`TerminalView`] so the
//! prompt can turn "open 3" into a click on the marker currently showing
//! station 3.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use map_sync::{
    FormMode, FormView, MapSurface, Marker, MarkerKey, Notice, NoticeLevel, PopupContent,
    PopupKey,
};
use station_common::{GeoPoint, Station, StationId};

/// What the terminal currently shows.
#[derive(Debug, Clone)]
pub struct TerminalView {
    pub markers: BTreeMap<StationId, Marker>,
    pub popup: Option<(PopupKey, PopupContent)>,
    pub zoom: f64,
    pub loading: bool,
    pub operator: Option<String>,
    pub notice: Option<Notice>,
    pub form: Option<FormView>,
    /// Station awaiting a delete confirmation.
    pub confirmation: Option<Station>,
}

impl Default for TerminalView {
    fn default() -> Self {
        Self {
            markers: BTreeMap::new(),
            popup: None,
            zoom: 13.0,
            loading: false,
            operator: None,
            notice: None,
            form: None,
            confirmation: None,
        }
    }
}

impl TerminalView {
    pub fn marker_key(&self, id: StationId) -> Option<MarkerKey> {
        self.markers.get(&id).map(|m| m.key)
    }

    pub fn popup_key(&self) -> Option<PopupKey> {
        self.popup.as_ref().map(|(key, _)| *key)
    }

    /// One line per displayed station, ordered by id.
    pub fn listing(&self) -> Vec<String> {
        self.markers
            .values()
            .map(|m| format!("  {:>5}  {:<32} {}", m.key.station, m.title, m.position))
            .collect()
    }
}

/// Shared handle to the view; the surface writes it, the prompt reads it.
pub type SharedView = Arc<Mutex<TerminalView>>;

pub fn lock_view(view: &SharedView) -> MutexGuard<'_, TerminalView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TerminalSurface {
    view: SharedView,
    out: Box<dyn Write + Send>,
}

impl TerminalSurface {
    pub fn new(view: SharedView) -> Self {
        Self::with_writer(view, Box::new(std::io::stdout()))
    }

    pub fn with_writer(view: SharedView, out: Box<dyn Write + Send>) -> Self {
        Self { view, out }
    }

    fn view(&self) -> MutexGuard<'_, TerminalView> {
        lock_view(&self.view)
    }

    // Terminal output is best effort; a closed stdout must not stop the map
    fn print(&mut self, line: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}", line.as_ref());
        let _ = self.out.flush();
    }
}

impl MapSurface for TerminalSurface {
    fn add_marker(&mut self, marker: &Marker) {
        self.view().markers.insert(marker.key.station, marker.clone());
    }

    fn remove_marker(&mut self, key: MarkerKey) {
        let mut view = self.view();
        if view.markers.get(&key.station).map(|m| m.key) == Some(key) {
            view.markers.remove(&key.station);
        }
    }

    fn open_popup(&mut self, key: PopupKey, content: &PopupContent) {
        self.view().popup = Some((key, content.clone()));
        let mut lines = content.lines().into_iter();
        if let Some(title) = lines.next() {
            self.print(format!("+ {} ({})", title, content.station));
        }
        for line in lines {
            self.print(format!("|   {}", line));
        }
        self.print("+ edit | delete | close");
    }

    fn close_popup(&mut self, key: PopupKey) {
        let mut view = self.view();
        if view.popup_key() == Some(key) {
            view.popup = None;
        }
    }

    fn fly_to(&mut self, center: GeoPoint, zoom: f64) {
        self.view().zoom = zoom;
        self.print(format!("[map] flying to {} at zoom {}", center, zoom));
    }

    fn show_notice(&mut self, notice: &Notice) {
        self.view().notice = Some(notice.clone());
        let level = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        self.print(format!("[{}] {}", level, notice.message));
    }

    fn clear_notice(&mut self) {
        self.view().notice = None;
    }

    fn set_loading(&mut self, loading: bool) {
        let was = std::mem::replace(&mut self.view().loading, loading);
        if loading && !was {
            self.print("[map] loading stations");
        }
    }

    fn set_station_count(&mut self, count: usize) {
        self.print(format!("[map] {} stations displayed", count));
    }

    fn set_operator(&mut self, username: Option<&str>) {
        self.view().operator = username.map(str::to_string);
        match username {
            Some(name) => self.print(format!("Signed in as {}", name)),
            None => self.print("Signed out"),
        }
    }

    fn show_form(&mut self, form: &FormView) {
        self.view().form = Some(form.clone());
        let title = match form.mode {
            FormMode::Create => "New station".to_string(),
            FormMode::Edit(id) => format!("Edit station {}", id),
        };
        self.print(format!("== {} ==", title));
        for (field, value) in &form.fields {
            self.print(format!("  {:<10} {}", field.label(), value));
        }
        if let Some(error) = &form.error {
            self.print(format!("  ! {}", error));
        }
        if form.submitting {
            self.print("  (saving)");
        } else {
            self.print("  set <field> <value> | submit | cancel");
        }
    }

    fn close_form(&mut self) {
        if self.view().form.take().is_some() {
            self.print("== form closed ==");
        }
    }

    fn confirm_delete(&mut self, station: &Station) {
        self.view().confirmation = Some(station.clone());
        self.print(format!(
            "Delete station '{}' ({})? confirm | keep",
            station.name, station.id
        ));
    }

    fn close_confirmation(&mut self) {
        self.view().confirmation = None;
    }
}
