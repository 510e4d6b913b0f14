//! Device replies and the flat records derived from them.
//!
//! Reply types mirror what the transport hands back; every leaf is optional
//! because the dish firmware adds and retires fields over time. The record
//! types ([`StatusRecord`], [`ObstructionDetail`], [`AlertDetail`],
//! [`LocationRecord`], [`ObstructionMap`]) are what gets reported.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DishError, Operation, Result};

/// Known dish alerts as `(name, field number)`, in declaration order.
///
/// The number decides the bit set in [`StatusRecord::alerts`].
pub const DISH_ALERTS: &[(&str, u32)] = &[
    ("motors_stuck", 1),
    ("thermal_throttle", 2),
    ("thermal_shutdown", 3),
    ("mast_not_near_vertical", 4),
    ("unexpected_location", 5),
    ("slow_ethernet_speeds", 6),
    ("roaming", 7),
    ("install_pending", 8),
    ("is_heating", 9),
    ("power_supply_thermal_throttle", 10),
    ("is_power_save_idle", 11),
    ("moving_while_not_mobile", 12),
    ("moving_too_fast_for_policy", 13),
    ("dbf_telem_stale", 14),
    ("low_motor_current", 15),
    ("lower_signal_than_predicted", 16),
    ("slow_ethernet_speeds_100", 17),
    ("obstruction_map_reset", 18),
];

/// Number of obstruction wedges reported in [`ObstructionDetail`].
pub const WEDGE_COUNT: usize = 12;

/// State reported for a dish that did not answer the status request.
pub const STATE_UNREACHABLE: &str = "DISH_UNREACHABLE";

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub id: Option<String>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    pub uptime_s: Option<u64>,
}

/// Present while the dish is not connected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outage {
    /// Cause name, e.g. `NO_SCHEDULE` or `BOOTING`.
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstructionStats {
    pub fraction_obstructed: Option<f64>,
    pub currently_obstructed: Option<bool>,
    pub valid_s: Option<f64>,
    pub avg_prolonged_obstruction_duration_s: Option<f64>,
    pub avg_prolonged_obstruction_interval_s: Option<f64>,
}

/// Reply to a status request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusReply {
    pub device_info: Option<DeviceInfo>,
    pub device_state: Option<DeviceState>,
    pub outage: Option<Outage>,
    pub seconds_to_first_nonempty_slot: Option<f64>,
    pub pop_ping_drop_rate: Option<f64>,
    pub downlink_throughput_bps: Option<f64>,
    pub uplink_throughput_bps: Option<f64>,
    pub pop_ping_latency_ms: Option<f64>,
    /// Alert name to active flag; names not in [`DISH_ALERTS`] are ignored.
    pub alerts: Option<BTreeMap<String, bool>>,
    pub obstruction_stats: Option<ObstructionStats>,
    pub boresight_azimuth_deg: Option<f64>,
    pub boresight_elevation_deg: Option<f64>,
    pub is_snr_above_noise_floor: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Lla {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: Option<f64>,
}

/// Reply to a location request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationReply {
    pub lla: Option<Lla>,
}

/// Reply to an obstruction map request: a row-major SNR grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstructionMapReply {
    pub num_rows: usize,
    pub num_cols: usize,
    pub snr: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Flattened dish status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusRecord {
    pub id: Option<String>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
    pub state: String,
    pub uptime: Option<u64>,
    /// No longer reported by the dish.
    pub snr: Option<f64>,
    pub seconds_to_first_nonempty_slot: Option<f64>,
    pub pop_ping_drop_rate: Option<f64>,
    pub downlink_throughput_bps: Option<f64>,
    pub uplink_throughput_bps: Option<f64>,
    pub pop_ping_latency_ms: Option<f64>,
    /// Bit `number - 1` is set for every active alert numbered below 65.
    pub alerts: u64,
    pub fraction_obstructed: Option<f64>,
    pub currently_obstructed: Option<bool>,
    /// No longer reported by the dish.
    pub seconds_obstructed: Option<f64>,
    pub obstruction_duration: Option<f64>,
    pub obstruction_interval: Option<f64>,
    pub direction_azimuth: Option<f64>,
    pub direction_elevation: Option<f64>,
    pub is_snr_above_noise_floor: Option<bool>,
}

impl StatusRecord {
    /// Placeholder recorded when the dish could not be reached.
    pub fn unreachable() -> Self {
        Self {
            state: STATE_UNREACHABLE.to_string(),
            ..Self::default()
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.state == STATE_UNREACHABLE
    }
}

/// Per-wedge obstruction data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObstructionDetail {
    /// Always empty: the dish stopped reporting wedges.
    pub wedges_fraction_obstructed: [Option<f64>; WEDGE_COUNT],
    pub raw_wedges_fraction_obstructed: [Option<f64>; WEDGE_COUNT],
    pub valid_s: Option<f64>,
}

impl Default for ObstructionDetail {
    fn default() -> Self {
        Self {
            wedges_fraction_obstructed: [None; WEDGE_COUNT],
            raw_wedges_fraction_obstructed: [None; WEDGE_COUNT],
            valid_s: None,
        }
    }
}

/// Active flag for every alert in [`DISH_ALERTS`], in table order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDetail {
    pub alerts: Vec<(&'static str, bool)>,
}

impl Default for AlertDetail {
    fn default() -> Self {
        Self {
            alerts: DISH_ALERTS.iter().map(|&(name, _)| (name, false)).collect(),
        }
    }
}

impl AlertDetail {
    pub fn is_active(&self, name: &str) -> bool {
        self.alerts.iter().any(|&(n, active)| n == name && active)
    }
}

/// Dish position. All `None` when location access is disabled on the dish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LocationRecord {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

impl LocationRecord {
    pub fn is_disabled(&self) -> bool {
        self.latitude.is_none()
    }
}

/// SNR grid, one `Vec` per row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObstructionMap {
    pub rows: Vec<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Reply -> record
// ---------------------------------------------------------------------------

fn outage_state(outage: Option<&Outage>) -> String {
    match outage {
        None => "CONNECTED".to_string(),
        Some(Outage { cause: Some(cause) }) if cause == "NO_SCHEDULE" => "SEARCHING".to_string(),
        Some(Outage { cause: Some(cause) }) => cause.clone(),
        Some(Outage { cause: None }) => "UNKNOWN".to_string(),
    }
}

fn alert_detail(alerts: Option<&BTreeMap<String, bool>>) -> (AlertDetail, u64) {
    let mut detail = AlertDetail::default();
    let mut bits = 0u64;
    let Some(alerts) = alerts else {
        return (detail, bits);
    };
    for name in alerts.keys() {
        if !DISH_ALERTS.iter().any(|&(known, _)| known == name) {
            log::debug!("ignoring unknown alert {name}");
        }
    }
    for (slot, &(name, number)) in detail.alerts.iter_mut().zip(DISH_ALERTS) {
        let active = alerts.get(name).copied().unwrap_or(false);
        slot.1 = active;
        if active && number < 65 {
            bits |= 1 << (number - 1);
        }
    }
    (detail, bits)
}

impl StatusReply {
    /// Split a status reply into the three reported records.
    pub fn into_records(self) -> (StatusRecord, ObstructionDetail, AlertDetail) {
        let (alert_detail, alert_bits) = alert_detail(self.alerts.as_ref());
        let obstruction = self.obstruction_stats.unwrap_or_default();

        let (obstruction_duration, obstruction_interval) = match (
            obstruction.avg_prolonged_obstruction_duration_s,
            obstruction.avg_prolonged_obstruction_interval_s,
        ) {
            (Some(duration), Some(interval)) if duration > 0.0 && !interval.is_nan() => {
                (Some(duration), Some(interval))
            }
            _ => (None, None),
        };

        let info = self.device_info.unwrap_or_default();
        let status = StatusRecord {
            id: info.id,
            hardware_version: info.hardware_version,
            software_version: info.software_version,
            state: outage_state(self.outage.as_ref()),
            uptime: self.device_state.and_then(|s| s.uptime_s),
            snr: None,
            seconds_to_first_nonempty_slot: self.seconds_to_first_nonempty_slot,
            pop_ping_drop_rate: self.pop_ping_drop_rate,
            downlink_throughput_bps: self.downlink_throughput_bps,
            uplink_throughput_bps: self.uplink_throughput_bps,
            pop_ping_latency_ms: self.pop_ping_latency_ms,
            alerts: alert_bits,
            fraction_obstructed: obstruction.fraction_obstructed,
            currently_obstructed: obstruction.currently_obstructed,
            seconds_obstructed: None,
            obstruction_duration,
            obstruction_interval,
            direction_azimuth: self.boresight_azimuth_deg,
            direction_elevation: self.boresight_elevation_deg,
            is_snr_above_noise_floor: self.is_snr_above_noise_floor,
        };
        let detail = ObstructionDetail {
            valid_s: obstruction.valid_s,
            ..ObstructionDetail::default()
        };
        (status, detail, alert_detail)
    }
}

impl LocationReply {
    pub fn into_record(self) -> Result<LocationRecord> {
        let lla = self
            .lla
            .ok_or_else(|| DishError::protocol(Operation::GetLocation, "reply has no lla"))?;
        Ok(LocationRecord {
            latitude: Some(lla.lat),
            longitude: Some(lla.lon),
            altitude: lla.alt,
        })
    }
}

impl ObstructionMapReply {
    pub fn into_map(self) -> Result<ObstructionMap> {
        let op = Operation::GetObstructionMap;
        if self.num_rows == 0 {
            return Ok(ObstructionMap::default());
        }
        if self.num_cols == 0 {
            return Err(DishError::protocol(op, "map has rows but no columns"));
        }
        let needed = self.num_rows * self.num_cols;
        if self.snr.len() < needed {
            return Err(DishError::protocol(
                op,
                format!("{} SNR values for a {needed}-cell map", self.snr.len()),
            ));
        }
        let rows = self.snr[..needed]
            .chunks(self.num_cols)
            .map(<[f64]>::to_vec)
            .collect();
        Ok(ObstructionMap { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply() -> StatusReply {
        serde_json::from_str(
            r#"{
                "device_info": {"id": "ut01", "hardware_version": "rev3", "software_version": "2024.1"},
                "device_state": {"uptime_s": 3600},
                "pop_ping_drop_rate": 0.01,
                "pop_ping_latency_ms": 31.5,
                "alerts": {"roaming": true, "is_heating": false, "motors_stuck": true, "retired_alert": true},
                "obstruction_stats": {
                    "fraction_obstructed": 0.02,
                    "currently_obstructed": false,
                    "valid_s": 900.0,
                    "avg_prolonged_obstruction_duration_s": 2.5,
                    "avg_prolonged_obstruction_interval_s": 60.0
                },
                "boresight_azimuth_deg": 12.0
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn connected_status_is_flattened() {
        let (status, detail, alerts) = reply().into_records();
        assert_eq!(status.id.as_deref(), Some("ut01"));
        assert_eq!(status.state, "CONNECTED");
        assert_eq!(status.uptime, Some(3600));
        assert_eq!(status.snr, None);
        assert_eq!(status.obstruction_duration, Some(2.5));
        assert_eq!(status.obstruction_interval, Some(60.0));
        assert_eq!(status.direction_elevation, None);
        assert_eq!(detail.valid_s, Some(900.0));
        assert_eq!(detail.wedges_fraction_obstructed, [None; WEDGE_COUNT]);
        assert!(alerts.is_active("roaming"));
        assert!(!alerts.is_active("is_heating"));
        assert!(!alerts.is_active("retired_alert"));
        assert_eq!(alerts.alerts.len(), DISH_ALERTS.len());
    }

    #[test]
    fn alert_bits_follow_field_numbers() {
        let (status, _, _) = reply().into_records();
        // motors_stuck = 1, roaming = 7
        assert_eq!(status.alerts, 0b100_0001);
    }

    #[test]
    fn outage_cause_becomes_state() {
        let mut r = reply();
        r.outage = Some(Outage {
            cause: Some("NO_SCHEDULE".into()),
        });
        assert_eq!(r.clone().into_records().0.state, "SEARCHING");
        r.outage = Some(Outage {
            cause: Some("BOOTING".into()),
        });
        assert_eq!(r.clone().into_records().0.state, "BOOTING");
        r.outage = Some(Outage::default());
        assert_eq!(r.into_records().0.state, "UNKNOWN");
    }

    #[test]
    fn prolonged_obstruction_needs_positive_duration_and_real_interval() {
        let mut r = reply();
        if let Some(stats) = r.obstruction_stats.as_mut() {
            stats.avg_prolonged_obstruction_interval_s = Some(f64::NAN);
        }
        let (status, _, _) = r.into_records();
        assert_eq!(status.obstruction_duration, None);
        assert_eq!(status.obstruction_interval, None);

        let mut r = reply();
        if let Some(stats) = r.obstruction_stats.as_mut() {
            stats.avg_prolonged_obstruction_duration_s = Some(0.0);
        }
        assert_eq!(r.into_records().0.obstruction_duration, None);
    }

    #[test]
    fn empty_reply_maps_to_empty_records() {
        let (status, detail, alerts) = StatusReply::default().into_records();
        assert_eq!(status.state, "CONNECTED");
        assert_eq!(status.alerts, 0);
        assert_eq!(detail, ObstructionDetail::default());
        assert_eq!(alerts, AlertDetail::default());
    }

    #[test]
    fn location_requires_lla() {
        let err = LocationReply::default().into_record().unwrap_err();
        assert!(matches!(err, DishError::Protocol { .. }));

        let loc = LocationReply {
            lla: Some(Lla {
                lat: 47.6,
                lon: -122.3,
                alt: None,
            }),
        }
        .into_record()
        .unwrap();
        assert_eq!(loc.latitude, Some(47.6));
        assert_eq!(loc.altitude, None);
        assert!(!loc.is_disabled());
    }

    #[test]
    fn obstruction_map_is_split_into_rows() {
        let map = ObstructionMapReply {
            num_rows: 2,
            num_cols: 3,
            snr: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
        }
        .into_map()
        .unwrap();
        assert_eq!(map.rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn short_obstruction_map_is_a_protocol_error() {
        let err = ObstructionMapReply {
            num_rows: 2,
            num_cols: 3,
            snr: vec![1.0; 5],
        }
        .into_map()
        .unwrap_err();
        assert!(err.to_string().contains("5 SNR values"));
    }

    #[test]
    fn unreachable_placeholder() {
        let s = StatusRecord::unreachable();
        assert!(s.is_unreachable());
        assert_eq!(s.id, None);
    }
}
