//! Create, edit and delete flows.
//!
//! One form at a time, with raw text fields parsed only on submit. An attempt
//! moves `Idle -> Submitting -> Succeeded | Failed`; while one is submitting,
//! no other submit, delete or form switch is accepted. A failed attempt keeps
//! the form contents so the operator can correct and resubmit. Deletes go
//! through an explicit confirmation step first.

use station_common::{GeoPoint, Station, StationDraft, StationError, StationId, StationResult};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Name,
    Latitude,
    Longitude,
    Capacity,
    Address,
}

impl FormField {
    pub const ALL: [FormField; 5] = [
        FormField::Name,
        FormField::Latitude,
        FormField::Longitude,
        FormField::Capacity,
        FormField::Address,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Name => "name",
            FormField::Latitude => "latitude",
            FormField::Longitude => "longitude",
            FormField::Capacity => "capacity",
            FormField::Address => "address",
        }
    }
}

impl std::str::FromStr for FormField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(FormField::Name),
            "lat" | "latitude" => Ok(FormField::Latitude),
            "lon" | "lng" | "longitude" => Ok(FormField::Longitude),
            "capacity" | "cap" => Ok(FormField::Capacity),
            "address" | "addr" => Ok(FormField::Address),
            other => Err(format!("unknown form field '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(StationId),
}

/// Raw form contents, as typed.
#[derive(Debug, Clone, PartialEq)]
pub struct StationForm {
    pub mode: FormMode,
    pub name: String,
    pub latitude: String,
    pub longitude: String,
    pub capacity: String,
    pub address: String,
}

impl StationForm {
    pub fn blank() -> Self {
        Self {
            mode: FormMode::Create,
            name: String::new(),
            latitude: String::new(),
            longitude: String::new(),
            capacity: String::new(),
            address: String::new(),
        }
    }

    /// Create form pre-filled with a position picked on the map.
    pub fn placed_at(at: GeoPoint) -> Self {
        Self {
            latitude: format!("{:.6}", at.latitude),
            longitude: format!("{:.6}", at.longitude),
            ..Self::blank()
        }
    }

    /// Edit form pre-filled with `station`'s fields.
    pub fn for_station(station: &Station) -> Self {
        Self {
            mode: FormMode::Edit(station.id),
            name: station.name.clone(),
            latitude: station.latitude.to_string(),
            longitude: station.longitude.to_string(),
            capacity: station.capacity.to_string(),
            address: station.address.clone().unwrap_or_default(),
        }
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Name => &self.name,
            FormField::Latitude => &self.latitude,
            FormField::Longitude => &self.longitude,
            FormField::Capacity => &self.capacity,
            FormField::Address => &self.address,
        }
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        match field {
            FormField::Name => self.name = value,
            FormField::Latitude => self.latitude = value,
            FormField::Longitude => self.longitude = value,
            FormField::Capacity => self.capacity = value,
            FormField::Address => self.address = value,
        }
    }

    /// Parse the raw fields into a payload. An empty capacity means the default.
    pub fn parse(&self) -> StationResult<StationDraft> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(StationError::invalid_field("name", "is required"));
        }
        let latitude = parse_coordinate(FormField::Latitude, &self.latitude)?;
        let longitude = parse_coordinate(FormField::Longitude, &self.longitude)?;

        let mut draft = StationDraft::new(name, GeoPoint::new(latitude, longitude))
            .with_address(self.address.trim());

        let capacity = self.capacity.trim();
        if !capacity.is_empty() {
            draft = draft.with_capacity(capacity.parse().map_err(|_| {
                StationError::invalid_field("capacity", "must be a whole number of docks")
            })?);
        }

        draft.validate()?;
        Ok(draft)
    }
}

fn parse_coordinate(field: FormField, raw: &str) -> StationResult<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StationError::invalid_field(field.label(), "is required"));
    }
    raw.parse()
        .map_err(|_| StationError::invalid_field(field.label(), "must be a number"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }
}

/// A repository call the event loop must make.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    Create(StationDraft),
    Update(StationId, StationDraft),
    Delete(StationId),
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRequest::Create(_) => MutationKind::Create,
            MutationRequest::Update(_, _) => MutationKind::Update,
            MutationRequest::Delete(_) => MutationKind::Delete,
        }
    }
}

/// What the service confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Created(Station),
    Updated(Station),
    Deleted(StationId),
}

impl MutationOutcome {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationOutcome::Created(_) => MutationKind::Create,
            MutationOutcome::Updated(_) => MutationKind::Update,
            MutationOutcome::Deleted(_) => MutationKind::Delete,
        }
    }
}

/// One submission, identified so its completion can be matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub id: u64,
    pub request: MutationRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationState {
    Idle,
    Submitting,
    Succeeded,
    Failed(StationError),
}

/// What the surface shows for the form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormView {
    pub mode: FormMode,
    pub fields: Vec<(FormField, String)>,
    pub submitting: bool,
    /// Inline error from the last attempt.
    pub error: Option<String>,
}

impl FormView {
    pub fn value(&self, field: FormField) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }
}

/// The attempt waiting for the service.
#[derive(Debug, Clone, Copy)]
struct Active {
    id: u64,
    kind: MutationKind,
}

/// Form and delete-confirmation state, and the single mutation in flight.
///
/// A delete never touches the form: its outcome is reported through
/// [`MutationController::state`] only, so an edit left open while deleting
/// another station survives with its input and without the delete's error.
#[derive(Debug)]
pub struct MutationController {
    form: Option<StationForm>,
    /// Inline error of the form's last submission.
    form_error: Option<StationError>,
    pending_delete: Option<Station>,
    state: MutationState,
    active: Option<Active>,
    attempts: u64,
}

impl Default for MutationController {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationController {
    pub fn new() -> Self {
        Self {
            form: None,
            form_error: None,
            pending_delete: None,
            state: MutationState::Idle,
            active: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> &MutationState {
        &self.state
    }

    pub fn is_submitting(&self) -> bool {
        self.active.is_some()
    }

    /// True while the form's own submission is in flight.
    pub fn form_submitting(&self) -> bool {
        self.active
            .is_some_and(|active| active.kind != MutationKind::Delete)
    }

    /// Kind of the attempt in flight, if any.
    pub fn active_kind(&self) -> Option<MutationKind> {
        self.active.map(|active| active.kind)
    }

    pub fn form(&self) -> Option<&StationForm> {
        self.form.as_ref()
    }

    pub fn pending_delete(&self) -> Option<&Station> {
        self.pending_delete.as_ref()
    }

    /// Open the create form, optionally pre-placed on the map.
    pub fn open_create(&mut self, at: Option<GeoPoint>) -> bool {
        let form = match at {
            Some(at) => StationForm::placed_at(at),
            None => StationForm::blank(),
        };
        self.open(form)
    }

    pub fn open_edit(&mut self, station: &Station) -> bool {
        self.open(StationForm::for_station(station))
    }

    fn open(&mut self, form: StationForm) -> bool {
        if self.form_submitting() {
            debug!("Form change ignored while the form is submitting");
            return false;
        }
        self.form = Some(form);
        self.form_error = None;
        if self.active.is_none() {
            self.pending_delete = None;
        }
        true
    }

    /// Update one raw field. Ignored while the form is submitting or closed.
    pub fn input(&mut self, field: FormField, value: impl Into<String>) -> bool {
        if self.form_submitting() {
            return false;
        }
        match self.form.as_mut() {
            Some(form) => {
                form.set(field, value);
                true
            }
            None => false,
        }
    }

    /// Close the form without submitting.
    pub fn cancel_form(&mut self) -> bool {
        if self.form_submitting() || self.form.is_none() {
            return false;
        }
        self.form = None;
        self.form_error = None;
        true
    }

    /// Validate the form and start an attempt.
    ///
    /// `Ok(None)` when there is nothing to submit or an attempt is already
    /// running. A parse failure keeps the form and is reported as `Err`.
    pub fn submit(&mut self) -> StationResult<Option<Attempt>> {
        if self.is_submitting() {
            debug!("Submit ignored, a mutation is already submitting");
            return Ok(None);
        }
        let Some(form) = self.form.as_ref() else {
            return Ok(None);
        };

        let draft = match form.parse() {
            Ok(draft) => draft,
            Err(err) => {
                self.form_error = Some(err.clone());
                return Err(err);
            }
        };
        let request = match form.mode {
            FormMode::Create => MutationRequest::Create(draft),
            FormMode::Edit(id) => MutationRequest::Update(id, draft),
        };
        self.form_error = None;
        Ok(Some(self.begin(request)))
    }

    /// Ask for confirmation before deleting `station`.
    pub fn request_delete(&mut self, station: &Station) -> bool {
        if self.is_submitting() {
            return false;
        }
        self.pending_delete = Some(station.clone());
        true
    }

    pub fn confirm_delete(&mut self) -> Option<Attempt> {
        if self.is_submitting() {
            return None;
        }
        let station = self.pending_delete.take()?;
        Some(self.begin(MutationRequest::Delete(station.id)))
    }

    pub fn cancel_delete(&mut self) -> bool {
        self.pending_delete.take().is_some()
    }

    fn begin(&mut self, request: MutationRequest) -> Attempt {
        self.attempts += 1;
        let kind = request.kind();
        self.active = Some(Active {
            id: self.attempts,
            kind,
        });
        self.state = MutationState::Submitting;
        debug!(attempt = self.attempts, kind = kind.as_str(), "Mutation submitting");
        Attempt {
            id: self.attempts,
            request,
        }
    }

    /// Record the result of attempt `id`. Returns false if it was not the active one.
    ///
    /// A successful form submission closes the form; a failed one keeps it
    /// for correction with the error inline. Deletes leave the form alone.
    pub fn complete(&mut self, id: u64, result: &StationResult<MutationOutcome>) -> bool {
        let Some(active) = self.active.filter(|active| active.id == id) else {
            return false;
        };
        self.active = None;
        self.state = match result {
            Ok(_) => MutationState::Succeeded,
            Err(err) => MutationState::Failed(err.clone()),
        };
        if active.kind != MutationKind::Delete {
            match result {
                Ok(_) => {
                    self.form = None;
                    self.form_error = None;
                }
                Err(err) => self.form_error = Some(err.clone()),
            }
        }
        true
    }

    /// Drop the form, any pending confirmation and any running attempt.
    pub fn reset(&mut self) {
        self.form = None;
        self.form_error = None;
        self.pending_delete = None;
        self.active = None;
        self.state = MutationState::Idle;
    }

    /// Current form presentation, if a form is open.
    pub fn view(&self) -> Option<FormView> {
        let form = self.form.as_ref()?;
        Some(FormView {
            mode: form.mode,
            fields: FormField::ALL
                .iter()
                .map(|&f| (f, form.get(f).to_string()))
                .collect(),
            submitting: self.form_submitting(),
            error: self.form_error.as_ref().map(StationError::user_message),
        })
    }
}
