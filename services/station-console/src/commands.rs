//! Line commands for the interactive map session.
//!
//! Each line typed at the prompt parses into a [`ConsoleCommand`]. Commands
//! that name a station by id are resolved against what the terminal surface
//! currently shows, so a stale id behaves like a click on nothing.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use map_sync::{FormField, MapEvent, PopupCommand};
use station_common::{GeoPoint, StationId};

use crate::terminal::TerminalView;

pub const HELP: &str = "\
Commands:
  pan <lat> <lon> [zoom]     move the map
  radius <km>                set the search radius
  open <station id>          click a station marker
  edit | delete | close      act on the open popup
  new                        open an empty create form
  place <lat> <lon>          create form placed at a position (shift+click)
  set <field> <value>        fill a form field (name, lat, lon, capacity, address)
  submit | cancel            submit or close the form
  confirm | keep             answer the delete confirmation
  refresh                    reload now
  dismiss                    dismiss the notice
  list                       list displayed stations
  stats                      print metrics
  logout | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Pan { center: GeoPoint, zoom: Option<f64> },
    Radius(i64),
    Open(StationId),
    Popup(PopupCommand),
    New,
    Place(GeoPoint),
    Set(FormField, String),
    Submit,
    Cancel,
    Confirm,
    Keep,
    Refresh,
    Dismiss,
    List,
    Stats,
    Help,
    Logout,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "pan" | "move" => {
                let (lat, lon, zoom) = match args.as_slice() {
                    [lat, lon] => (*lat, *lon, None),
                    [lat, lon, zoom] => (*lat, *lon, Some(number::<f64>(zoom, "zoom")?)),
                    _ => bail!("usage: pan <lat> <lon> [zoom]"),
                };
                ConsoleCommand::Pan {
                    center: point(lat, lon)?,
                    zoom,
                }
            }
            "radius" => match args.as_slice() {
                [km] => ConsoleCommand::Radius(number(km, "radius")?),
                _ => bail!("usage: radius <km>"),
            },
            "open" | "click" => match args.as_slice() {
                [id] => ConsoleCommand::Open(StationId(number(id, "station id")?)),
                _ => bail!("usage: open <station id>"),
            },
            "edit" => ConsoleCommand::Popup(PopupCommand::Edit),
            "delete" => ConsoleCommand::Popup(PopupCommand::Delete),
            "close" => ConsoleCommand::Popup(PopupCommand::Close),
            "new" => ConsoleCommand::New,
            "place" => match args.as_slice() {
                [lat, lon] => ConsoleCommand::Place(point(lat, lon)?),
                _ => bail!("usage: place <lat> <lon>"),
            },
            "set" => {
                let Some((field, value)) = args.split_first() else {
                    bail!("usage: set <field> <value>");
                };
                let field: FormField = field.parse().map_err(|e: String| anyhow!(e))?;
                ConsoleCommand::Set(field, value.join(" "))
            }
            "submit" | "save" => ConsoleCommand::Submit,
            "cancel" => ConsoleCommand::Cancel,
            "confirm" | "yes" => ConsoleCommand::Confirm,
            "keep" | "no" => ConsoleCommand::Keep,
            "refresh" | "reload" => ConsoleCommand::Refresh,
            "dismiss" => ConsoleCommand::Dismiss,
            "list" | "ls" => ConsoleCommand::List,
            "stats" => ConsoleCommand::Stats,
            "help" | "?" => ConsoleCommand::Help,
            "logout" => ConsoleCommand::Logout,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(command)
    }
}

impl ConsoleCommand {
    /// The map event this command stands for, given what is on screen.
    ///
    /// Returns `None` for commands handled by the console itself and for
    /// input aimed at a marker, popup, form or confirmation that is not
    /// displayed.
    pub fn to_event(&self, view: &TerminalView) -> Option<MapEvent> {
        let event = match self {
            ConsoleCommand::Pan { center, zoom } => MapEvent::MoveEnd {
                center: *center,
                zoom: zoom.unwrap_or(view.zoom),
            },
            ConsoleCommand::Radius(km) => MapEvent::RadiusInput(*km),
            ConsoleCommand::Open(id) => MapEvent::MarkerClicked(view.marker_key(*id)?),
            ConsoleCommand::Popup(command) => MapEvent::PopupAction(view.popup_key()?, *command),
            ConsoleCommand::New => MapEvent::NewStation,
            ConsoleCommand::Place(at) => MapEvent::MapClicked {
                at: *at,
                modifier: true,
            },
            ConsoleCommand::Set(..) | ConsoleCommand::Submit | ConsoleCommand::Cancel
                if view.form.is_none() =>
            {
                return None
            }
            ConsoleCommand::Confirm | ConsoleCommand::Keep if view.confirmation.is_none() => {
                return None
            }
            ConsoleCommand::Set(field, value) => MapEvent::FormInput(*field, value.clone()),
            ConsoleCommand::Submit => MapEvent::FormSubmit,
            ConsoleCommand::Cancel => MapEvent::FormCancel,
            ConsoleCommand::Confirm => MapEvent::DeleteConfirmed,
            ConsoleCommand::Keep => MapEvent::DeleteCancelled,
            ConsoleCommand::Refresh => MapEvent::Refresh,
            ConsoleCommand::Dismiss => MapEvent::DismissNotice,
            ConsoleCommand::Logout => MapEvent::Logout,
            ConsoleCommand::List
            | ConsoleCommand::Stats
            | ConsoleCommand::Help
            | ConsoleCommand::Quit => return None,
        };
        Some(event)
    }
}

fn number<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse()
        .ok()
        .with_context(|| format!("{} must be a number, got '{}'", what, raw))
}

fn point(lat: &str, lon: &str) -> Result<GeoPoint> {
    let point = GeoPoint::new(number(lat, "latitude")?, number(lon, "longitude")?);
    point.validate()?;
    Ok(point)
}
