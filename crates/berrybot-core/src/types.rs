use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BerrybotError;

// =============================================================================
// Chat view state
// =============================================================================

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Assistant,
}

/// What a message carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    File,
}

/// Lifecycle of a message slot.
///
/// `Processing` is the only non-terminal state; it moves to `Received` exactly
/// once and is never reopened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Sent,
    Received,
    Processing,
}

/// One entry of the in-memory conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub origin: Origin,
    pub kind: MessageKind,
    pub state: MessageState,
}

impl ChatMessage {
    /// A text message typed by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: Origin::User,
            kind: MessageKind::Text,
            state: MessageState::Sent,
        }
    }

    /// A finished assistant reply.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: Origin::Assistant,
            kind: MessageKind::Text,
            state: MessageState::Received,
        }
    }

    /// An empty assistant slot waiting for a response frame.
    pub fn placeholder() -> Self {
        Self {
            content: String::new(),
            origin: Origin::Assistant,
            kind: MessageKind::Text,
            state: MessageState::Processing,
        }
    }

    /// A note that the user attached a file.
    pub fn file_upload(name: &str) -> Self {
        Self {
            content: format!("File uploaded: {}", name),
            origin: Origin::User,
            kind: MessageKind::File,
            state: MessageState::Sent,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.state == MessageState::Processing
    }
}

// =============================================================================
// Analytics
// =============================================================================

/// Reporting window for session analytics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Today,
    Weekly,
    Monthly,
    Yearly,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Today,
        Timeframe::Weekly,
        Timeframe::Monthly,
        Timeframe::Yearly,
    ];

    /// Wire value used in the `timeframe` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Today => "today",
            Timeframe::Weekly => "weekly",
            Timeframe::Monthly => "monthly",
            Timeframe::Yearly => "yearly",
        }
    }

    /// Label shown in the timeframe selector.
    pub fn display_name(&self) -> &'static str {
        match self {
            Timeframe::Today => "Daily",
            Timeframe::Weekly => "Weekly",
            Timeframe::Monthly => "Monthly",
            Timeframe::Yearly => "Yearly",
        }
    }

    /// Start of the window containing `now`. The window always ends at `now`.
    ///
    /// Weeks start on Monday. All boundaries are UTC midnights.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let start = match self {
            Timeframe::Today => today,
            Timeframe::Weekly => {
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            Timeframe::Monthly => today.with_day(1).unwrap_or(today),
            Timeframe::Yearly => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        };
        Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN))
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = BerrybotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "today" => Ok(Timeframe::Today),
            "weekly" => Ok(Timeframe::Weekly),
            "monthly" => Ok(Timeframe::Monthly),
            "yearly" => Ok(Timeframe::Yearly),
            _ => Err(BerrybotError::InvalidTimeframe(s.to_string())),
        }
    }
}

/// Question categories shown on the analytics dashboard, in display order.
pub const CATEGORIES: [&str; 17] = [
    "Chemical Registrations and MRL's",
    "Disease",
    "Economics",
    "Field Establishment",
    "Harvest",
    "Insects",
    "Irrigation",
    "Nutrition",
    "Pest Management Guide",
    "Pollination",
    "Post Harvest Handling, Cold Chain",
    "Production",
    "Pruning",
    "Sanitation",
    "Varietal Information",
    "Weeds",
    "Unknown",
];

/// Category recorded when the agent does not classify a question.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Static name-to-coordinate lookup for grower locations (lat, lon).
pub const LOCATION_COORDINATES: [(&str, (f64, f64)); 5] = [
    ("Texas", (31.9686, -99.9018)),
    ("Tempe", (33.4255, -111.9400)),
    ("Seattle", (47.6062, -122.3321)),
    ("New York", (40.7128, -74.006)),
    ("California", (36.7783, -119.4179)),
];

/// Coordinates for a location name, if it is in the lookup table.
pub fn location_coordinates(name: &str) -> Option<(f64, f64)> {
    LOCATION_COORDINATES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, coords)| *coords)
}
