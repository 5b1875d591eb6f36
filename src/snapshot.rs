//! Environmental telemetry fed into the engine
//!
//! An [`EnvironmentalSnapshot`] is a plain value: whoever polls the
//! geolocation, weather and clock sources builds one (or merges a
//! [`TelemetryUpdate`] into the previous one) and hands it to the engine.
//! Bad sensor data is never rejected; [`EnvironmentalSnapshot::sanitized`]
//! replaces non-finite readings and clamps everything into range.

use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// One reading of the environment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentalSnapshot {
    /// Degrees, [-90, 90]
    pub latitude: f32,
    /// Degrees, [-180, 180]
    pub longitude: f32,
    /// Meters per second, >= 0
    #[serde(alias = "speedMetersPerSecond", alias = "speed")]
    pub speed_mps: f32,
    #[serde(alias = "temperatureCelsius", alias = "temperature")]
    pub temperature_c: f32,
    /// [0, 100]
    #[serde(alias = "humidityPercent", alias = "humidity")]
    pub humidity_percent: f32,
    /// Degrees, [0, 360)
    #[serde(alias = "headingDegrees", alias = "heading")]
    pub heading_degrees: f32,
    /// Fraction of the day, [0, 1); 0 is midnight, 0.5 is noon
    #[serde(alias = "timeOfDayFraction", alias = "timeOfDay")]
    pub time_of_day: f32,
}

/// Neutral reading: equator, at rest, 20 °C, 50 % humidity, facing north
/// at solar noon
impl Default for EnvironmentalSnapshot {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            speed_mps: 0.0,
            temperature_c: 20.0,
            humidity_percent: 50.0,
            heading_degrees: 0.0,
            time_of_day: 0.5,
        }
    }
}

/// Snapshot fields mapped onto [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedFactors {
    pub latitude: f32,
    pub longitude: f32,
    pub speed: f32,
    pub temperature: f32,
    pub time_of_day: f32,
    pub humidity: f32,
}

/// Speed at which the speed factor saturates (m/s)
pub const SPEED_SATURATION_MPS: f32 = 30.0;

impl EnvironmentalSnapshot {
    /// Reading without humidity or heading sensors
    pub fn new(
        latitude: f32,
        longitude: f32,
        speed_mps: f32,
        temperature_c: f32,
        time_of_day: f32,
    ) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            temperature_c,
            time_of_day,
            ..Self::default()
        }
    }

    pub fn with_humidity(mut self, humidity_percent: f32) -> Self {
        self.humidity_percent = humidity_percent;
        self
    }

    pub fn with_heading(mut self, heading_degrees: f32) -> Self {
        self.heading_degrees = heading_degrees;
        self
    }

    /// Every field finite and within its documented range
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        Self {
            latitude: finite_or(self.latitude, d.latitude).clamp(-90.0, 90.0),
            longitude: finite_or(self.longitude, d.longitude).clamp(-180.0, 180.0),
            speed_mps: finite_or(self.speed_mps, d.speed_mps).max(0.0),
            temperature_c: finite_or(self.temperature_c, d.temperature_c).clamp(-100.0, 100.0),
            humidity_percent: finite_or(self.humidity_percent, d.humidity_percent)
                .clamp(0.0, 100.0),
            heading_degrees: wrap(finite_or(self.heading_degrees, d.heading_degrees), 360.0),
            time_of_day: wrap(finite_or(self.time_of_day, d.time_of_day), 1.0),
        }
    }

    /// Normalized factors of the sanitized snapshot
    pub fn normalized(&self) -> NormalizedFactors {
        let s = self.sanitized();
        NormalizedFactors {
            latitude: (s.latitude + 90.0) / 180.0,
            longitude: (s.longitude + 180.0) / 360.0,
            speed: (s.speed_mps / SPEED_SATURATION_MPS).min(1.0),
            temperature: ((s.temperature_c + 20.0) / 60.0).clamp(0.0, 1.0),
            time_of_day: s.time_of_day,
            humidity: s.humidity_percent / 100.0,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Wrap into [0, period); rem_euclid can round up to `period` itself
fn wrap(value: f32, period: f32) -> f32 {
    let wrapped = value.rem_euclid(period);
    if wrapped >= period {
        0.0
    } else {
        wrapped
    }
}

/// Partial telemetry from one collaborator
///
/// Geolocation, weather and the clock report independently; absent fields
/// keep the previous reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryUpdate {
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
    #[serde(alias = "speedMetersPerSecond", alias = "speed")]
    pub speed_mps: Option<f32>,
    #[serde(alias = "temperatureCelsius", alias = "temperature")]
    pub temperature_c: Option<f32>,
    #[serde(alias = "humidityPercent", alias = "humidity")]
    pub humidity_percent: Option<f32>,
    #[serde(alias = "headingDegrees", alias = "heading")]
    pub heading_degrees: Option<f32>,
    #[serde(alias = "timeOfDayFraction", alias = "timeOfDay")]
    pub time_of_day: Option<f32>,
    /// Wall clock (Unix seconds); derives solar time-of-day when
    /// `time_of_day` is absent
    #[serde(alias = "unixTime")]
    pub unix_time: Option<f64>,
}

impl TelemetryUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge into `previous`, field by field
    pub fn merge_into(&self, previous: &EnvironmentalSnapshot) -> EnvironmentalSnapshot {
        let mut next = *previous;
        if let Some(v) = self.latitude {
            next.latitude = v;
        }
        if let Some(v) = self.longitude {
            next.longitude = v;
        }
        if let Some(v) = self.speed_mps {
            next.speed_mps = v;
        }
        if let Some(v) = self.temperature_c {
            next.temperature_c = v;
        }
        if let Some(v) = self.humidity_percent {
            next.humidity_percent = v;
        }
        if let Some(v) = self.heading_degrees {
            next.heading_degrees = v;
        }
        match (self.time_of_day, self.unix_time) {
            (Some(t), _) => next.time_of_day = t,
            (None, Some(unix)) => next.time_of_day = solar_time_of_day(unix, next.longitude),
            (None, None) => {}
        }
        next
    }
}

/// Local mean solar time as a fraction of the day
///
/// UTC time-of-day shifted by 1/360 of a day per degree of longitude east.
pub fn solar_time_of_day(unix_seconds: f64, longitude: f32) -> f32 {
    let utc = unix_seconds.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_DAY;
    let longitude = if longitude.is_finite() { longitude as f64 } else { 0.0 };
    wrap((utc + longitude / 360.0).rem_euclid(1.0) as f32, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let raw = EnvironmentalSnapshot {
            latitude: f32::NAN,
            longitude: f32::INFINITY,
            speed_mps: f32::NEG_INFINITY,
            temperature_c: f32::NAN,
            humidity_percent: f32::NAN,
            heading_degrees: f32::NAN,
            time_of_day: f32::NAN,
        };
        assert_eq!(raw.sanitized(), EnvironmentalSnapshot::default());
    }

    #[test]
    fn test_sanitize_clamps_and_wraps() {
        let raw = EnvironmentalSnapshot {
            latitude: 120.0,
            longitude: -500.0,
            speed_mps: -3.0,
            temperature_c: 20.0,
            humidity_percent: 140.0,
            heading_degrees: -90.0,
            time_of_day: 1.25,
        };
        let s = raw.sanitized();
        assert_eq!(s.latitude, 90.0);
        assert_eq!(s.longitude, -180.0);
        assert_eq!(s.speed_mps, 0.0);
        assert_eq!(s.humidity_percent, 100.0);
        assert_eq!(s.heading_degrees, 270.0);
        assert!((s.time_of_day - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_factors() {
        let snap = EnvironmentalSnapshot::new(90.0, 0.0, 60.0, 40.0, 0.25);
        let n = snap.normalized();
        assert_eq!(n.latitude, 1.0);
        assert_eq!(n.longitude, 0.5);
        assert_eq!(n.speed, 1.0);
        assert_eq!(n.temperature, 1.0);
        assert_eq!(n.time_of_day, 0.25);
        assert_eq!(n.humidity, 0.5);
    }

    #[test]
    fn test_update_merges_only_present_fields() {
        let base = EnvironmentalSnapshot::new(10.0, 20.0, 1.0, 15.0, 0.3);
        let update = TelemetryUpdate {
            temperature_c: Some(25.0),
            humidity_percent: Some(80.0),
            ..Default::default()
        };
        let next = update.merge_into(&base);
        assert_eq!(next.latitude, 10.0);
        assert_eq!(next.temperature_c, 25.0);
        assert_eq!(next.humidity_percent, 80.0);
        assert_eq!(next.time_of_day, 0.3);
    }

    #[test]
    fn test_update_derives_time_from_wall_clock() {
        let update = TelemetryUpdate {
            longitude: Some(90.0),
            unix_time: Some(6.0 * 3600.0),
            ..Default::default()
        };
        // 06:00 UTC, 90° east: local solar noon
        let next = update.merge_into(&EnvironmentalSnapshot::default());
        assert!((next.time_of_day - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_solar_time_wraps_westward() {
        let t = solar_time_of_day(0.0, -90.0);
        assert!((t - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_camel_case_json_accepted() {
        let json = r#"{"latitude": 51.5, "speedMetersPerSecond": 2.0, "timeOfDayFraction": 0.75}"#;
        let snap: EnvironmentalSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.speed_mps, 2.0);
        assert_eq!(snap.time_of_day, 0.75);
        assert_eq!(snap.temperature_c, 20.0);
    }
}
