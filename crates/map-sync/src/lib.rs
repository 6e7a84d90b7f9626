//! Keeps an interactive station map in sync with the station service.
//!
//! The pieces, bottom-up:
//! - [`ViewportState`]: center and radius, with change notification
//! - [`Reconciler`]: debounced, sequence-tagged reloads into a [`StationCache`]
//! - [`MarkerManager`]: one marker per cached station, at most one popup
//! - [`MutationController`]: create/edit/delete forms and their attempts
//! - [`StationMap`]: the event loop that owns all of the above and talks to a
//!   [`MapSurface`] and a [`StationRepository`](station_client::StationRepository)

pub mod cache;
pub mod config;
pub mod map;
pub mod markers;
pub mod metrics;
pub mod mutation;
pub mod reconciler;
pub mod surface;
pub mod viewport;

pub use cache::StationCache;
pub use config::SyncConfig;
pub use map::{MapEvent, PopupCommand, SessionEnd, StationMap};
pub use markers::{Marker, MarkerKey, MarkerManager, OpenPopup, PopupContent, PopupKey};
pub use metrics::{SyncMetrics, SyncMetricsSnapshot};
pub use mutation::{
    Attempt, FormField, FormMode, FormView, MutationController, MutationKind, MutationOutcome,
    MutationRequest, MutationState, StationForm,
};
pub use reconciler::{Completion, Reconciler, ReloadOutcome, ReloadTicket};
pub use surface::{MapSurface, Notice, NoticeLevel};
pub use viewport::{Viewport, ViewportState};
