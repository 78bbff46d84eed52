use crate::{ComputationError, FinishResponse, GeoPoint, geo::trace_distance_km};

pub const DEFAULT_FUEL_PRICE_PER_LITER: f64 = 150.0;
pub const DEFAULT_FUEL_EFFICIENCY_KM_PER_LITER: f64 = 15.0;

/// Layout of the start and end times in a [`FinishResponse`].
const COMPACT_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FuelRates {
    pub price_per_liter: f64,
    pub efficiency_km_per_liter: f64,
}

impl Default for FuelRates {
    fn default() -> Self {
        Self {
            price_per_liter: DEFAULT_FUEL_PRICE_PER_LITER,
            efficiency_km_per_liter: DEFAULT_FUEL_EFFICIENCY_KM_PER_LITER,
        }
    }
}

impl FuelRates {
    /// Builds rates from raw configuration strings. Each value falls back to
    /// its default on its own when it is absent or not a finite number. The
    /// efficiency divides the distance and must also be positive.
    #[must_use]
    pub fn from_raw(price_per_liter: Option<&str>, efficiency_km_per_liter: Option<&str>) -> Self {
        Self {
            price_per_liter: parse_finite(price_per_liter)
                .unwrap_or(DEFAULT_FUEL_PRICE_PER_LITER),
            efficiency_km_per_liter: parse_finite(efficiency_km_per_liter)
                .filter(|v| *v > 0.0)
                .unwrap_or(DEFAULT_FUEL_EFFICIENCY_KM_PER_LITER),
        }
    }

    /// Cost of driving `distance_km` kilometres.
    #[must_use]
    pub fn cost(&self, distance_km: f64) -> f64 {
        distance_km / self.efficiency_km_per_liter * self.price_per_liter
    }

    /// Computes the totals reported to the client for a completed trace.
    ///
    /// # Errors
    ///
    /// Returns [`ComputationError::EmptyTrace`] when `points` is empty, since
    /// there are then no start and end times to report.
    pub fn summarize(
        &self,
        trace: &str,
        points: &[GeoPoint],
    ) -> Result<FinishResponse, ComputationError> {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(ComputationError::EmptyTrace(trace.to_owned()));
        };
        let distance = trace_distance_km(points);

        Ok(FinishResponse {
            distance,
            fuel_cost: self.cost(distance),
            start_time: first.timestamp.format(COMPACT_TIME_FORMAT).to_string(),
            end_time: last.timestamp.format(COMPACT_TIME_FORMAT).to_string(),
        })
    }
}

fn parse_finite(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::geo::haversine_km;

    fn point(ts: &str, latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint::new(DateTime::parse_from_rfc3339(ts).unwrap(), latitude, longitude)
    }

    #[test]
    fn defaults_when_unconfigured() {
        assert_eq!(FuelRates::from_raw(None, None), FuelRates::default());
        assert_eq!(
            FuelRates::from_raw(Some("cheap"), Some("")),
            FuelRates::default()
        );
    }

    #[test]
    fn each_value_falls_back_independently() {
        let rates = FuelRates::from_raw(Some("170.5"), Some("abc"));
        assert!((rates.price_per_liter - 170.5).abs() < f64::EPSILON);
        assert!((rates.efficiency_km_per_liter - 15.0).abs() < f64::EPSILON);

        let rates = FuelRates::from_raw(Some("inf"), Some(" 20 "));
        assert!((rates.price_per_liter - 150.0).abs() < f64::EPSILON);
        assert!((rates.efficiency_km_per_liter - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn configured_free_fuel_costs_nothing() {
        let rates = FuelRates::from_raw(Some("0"), None);
        assert!(rates.price_per_liter.abs() < f64::EPSILON);
        assert!(rates.cost(10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_efficiency_is_rejected() {
        let rates = FuelRates::from_raw(None, Some("0"));
        assert!((rates.efficiency_km_per_liter - 15.0).abs() < f64::EPSILON);
        let rates = FuelRates::from_raw(None, Some("-4"));
        assert!((rates.efficiency_km_per_liter - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_is_distance_over_efficiency_times_price() {
        assert!((FuelRates::default().cost(30.0) - 300.0).abs() < 1e-9);
        let rates = FuelRates::from_raw(Some("200"), Some("10"));
        assert!((rates.cost(5.0) - 100.0).abs() < 1e-9);
        assert!(rates.cost(0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_of_single_point() {
        let points = [point("2023-10-10T10:00:00Z", 35.6895, 139.6917)];
        let finish = FuelRates::default().summarize("t", &points).unwrap();
        assert!(finish.distance.abs() < f64::EPSILON);
        assert!(finish.fuel_cost.abs() < f64::EPSILON);
        assert_eq!(finish.start_time, "20231010100000");
        assert_eq!(finish.end_time, "20231010100000");
    }

    #[test]
    fn summary_uses_first_and_last_times_in_client_offset() {
        let points = [
            point("2023-10-10T10:00:00+09:00", 35.6895, 139.6917),
            point("2023-10-10T10:10:30+09:00", 35.6762, 139.6503),
        ];
        let finish = FuelRates::default().summarize("t", &points).unwrap();
        let expected = haversine_km(&points[0], &points[1]);
        assert!((finish.distance - expected).abs() < 1e-9);
        assert!((finish.fuel_cost - expected / 15.0 * 150.0).abs() < 1e-9);
        assert_eq!(finish.start_time, "20231010100000");
        assert_eq!(finish.end_time, "20231010101030");
    }

    #[test]
    fn summary_of_empty_trace_fails() {
        assert_eq!(
            FuelRates::default().summarize("gone", &[]),
            Err(ComputationError::EmptyTrace("gone".to_string()))
        );
    }
}
