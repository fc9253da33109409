use ulid::Ulid;

/// Abstract failure class of an engine error. Transports map these onto
/// their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    InvalidInput(String),
    VenueNotFound(Ulid),
    BookingNotFound(Ulid),
    /// Slot generation with an empty venue registry.
    NoVenues,
    /// Overlaps an existing booking on the same court.
    Conflict(Ulid),
    DuplicateName(String),
    VenueHasBookings { id: Ulid, bookings: usize },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput(_) | EngineError::LimitExceeded(_) => ErrorKind::InvalidInput,
            EngineError::VenueNotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::NoVenues => ErrorKind::NotFound,
            EngineError::Conflict(_)
            | EngineError::DuplicateName(_)
            | EngineError::VenueHasBookings { .. } => ErrorKind::Conflict,
            EngineError::WalError(_) => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::VenueNotFound(id) => write!(f, "venue not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::NoVenues => write!(f, "no venues registered"),
            EngineError::Conflict(id) => {
                write!(f, "court already booked for this time (conflicts with booking {id})")
            }
            EngineError::DuplicateName(name) => write!(f, "venue name already in use: {name}"),
            EngineError::VenueHasBookings { id, bookings } => {
                write!(f, "cannot delete venue {id}: {bookings} booking(s) still reference it")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
