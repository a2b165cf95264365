/// A single position sample delivered by the location source.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl Fix {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, observed_at: chrono::DateTime<chrono::Utc>) -> Self {
        Fix {
            latitude,
            longitude,
            observed_at,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LocalIdentity {
    pub callsign: String,
}

impl LocalIdentity {
    #[must_use]
    pub fn new(callsign: impl Into<String>) -> Self {
        LocalIdentity {
            callsign: callsign.into(),
        }
    }
}

/// Decoded peer position, handed to every subscriber.
#[derive(Debug, PartialEq, Clone)]
pub struct PositionUpdate {
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_seen_at: chrono::DateTime<chrono::Utc>,
}

impl PositionUpdate {
    /// Builds an update from wire values. `age_seconds` is how stale the fix already was
    /// when the peer sent it, so it is subtracted from the local receipt time.
    #[must_use]
    pub fn from_wire(
        callsign: String,
        lat: MicroDegrees,
        lon: MicroDegrees,
        age_seconds: u32,
        received_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        PositionUpdate {
            callsign,
            latitude: lat.to_degrees(),
            longitude: lon.to_degrees(),
            last_seen_at: received_at - chrono::TimeDelta::seconds(i64::from(age_seconds)),
        }
    }
}

/// Fixed-point angle in millionths of a degree, as carried on the wire.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MicroDegrees(i32);

impl MicroDegrees {
    pub const SCALE: f64 = 1_000_000.0;

    /// Truncates toward zero. Out-of-range inputs saturate at the `i32` bounds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_degrees(degrees: f64) -> Self {
        MicroDegrees((degrees * Self::SCALE) as i32)
    }

    #[must_use]
    pub fn from_raw(value: i32) -> Self {
        MicroDegrees(value)
    }

    #[must_use]
    pub fn to_degrees(self) -> f64 {
        f64::from(self.0) / Self::SCALE
    }

    #[must_use]
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for MicroDegrees {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.to_degrees())
    }
}
