//! The seam between the sync engine and whatever draws the map.
//!
//! A surface renders markers, popups, notices and forms, and reports user
//! input back as [`MapEvent`](crate::MapEvent)s. It never decides anything:
//! every call it receives is an instruction from the engine.

use station_common::{BoundingBox, ErrorKind, GeoPoint, Station, StationError};

use crate::markers::{Marker, MarkerKey, PopupContent, PopupKey};
use crate::mutation::FormView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible message outside the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Whether the operator can dismiss it and keep working.
    pub dismissible: bool,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            dismissible: true,
        }
    }

    /// Presentation for a failed operation.
    ///
    /// Network trouble is a dismissible warning. Auth failures are not
    /// dismissible: the operator has to sign in again.
    pub fn from_error(error: &StationError) -> Self {
        let (level, dismissible) = match error.kind() {
            ErrorKind::Network => (NoticeLevel::Warning, true),
            ErrorKind::Validation => (NoticeLevel::Error, true),
            ErrorKind::Auth => (NoticeLevel::Error, false),
        };
        Self {
            level,
            message: error.user_message(),
            dismissible,
        }
    }
}

/// Rendering side of the map.
pub trait MapSurface: Send {
    fn add_marker(&mut self, marker: &Marker);

    /// Detach a marker and release its click handler.
    fn remove_marker(&mut self, key: MarkerKey);

    fn open_popup(&mut self, key: PopupKey, content: &PopupContent);

    fn close_popup(&mut self, key: PopupKey);

    /// Start an animated move; the surface reports `MoveEnd` when it settles.
    fn fly_to(&mut self, center: GeoPoint, zoom: f64);

    /// Area currently on screen, if the surface knows it.
    fn visible_bounds(&self) -> Option<BoundingBox> {
        None
    }

    fn show_notice(&mut self, notice: &Notice);

    fn clear_notice(&mut self);

    fn set_loading(&mut self, _loading: bool) {}

    fn set_station_count(&mut self, _count: usize) {}

    /// Display name of the signed-in operator, or `None` once signed out.
    fn set_operator(&mut self, _username: Option<&str>) {}

    /// Show or refresh the station form.
    fn show_form(&mut self, form: &FormView);

    fn close_form(&mut self);

    /// Ask the operator to confirm deleting `station`.
    fn confirm_delete(&mut self, station: &Station);

    fn close_confirmation(&mut self);
}
