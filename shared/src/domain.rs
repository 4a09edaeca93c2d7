use serde::{Deserialize, Serialize};

/// A complete telemetry snapshot reported by a device.
///
/// Records are never merged: every write carries all fields and replaces the
/// previous snapshot for the same key. Unknown fields in incoming JSON are
/// ignored, missing ones are an error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub coordinates: Coordinates,
    pub temp: f64,
    pub rotations: Rotations,
    pub status: PowerStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Orientation in degrees.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Rotations {
    /// pitch
    pub p: f64,
    /// yaw
    pub y: f64,
    /// roll
    pub r: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerStatus {
    pub payload_power: bool,
    pub data_waiting: bool,
    pub charge_status: ChargeStatus,
    pub voltage: f64,
}

/// Devices report charge either as a level or as a state label such as
/// `"charging"`. Whatever form came in is the form that goes out.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ChargeStatus {
    Level(f64),
    State(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drone() -> serde_json::Value {
        json!({
            "coordinates": { "x": 1.5, "y": 2.0, "z": -3.25 },
            "temp": 21.7,
            "rotations": { "p": 0.0, "y": 90.0, "r": 180.0 },
            "status": {
                "payloadPower": true,
                "dataWaiting": false,
                "chargeStatus": "charging",
                "voltage": 12.4
            }
        })
    }

    #[test]
    fn parses_wire_field_names() {
        let record: TelemetryRecord = serde_json::from_value(drone()).unwrap();
        assert_eq!(
            record.coordinates,
            Coordinates {
                x: 1.5,
                y: 2.0,
                z: -3.25
            }
        );
        assert_eq!(record.temp, 21.7);
        assert_eq!(
            record.rotations,
            Rotations {
                p: 0.0,
                y: 90.0,
                r: 180.0
            }
        );
        assert!(record.status.payload_power);
        assert!(!record.status.data_waiting);
        assert_eq!(
            record.status.charge_status,
            ChargeStatus::State("charging".to_owned())
        );
        assert_eq!(record.status.voltage, 12.4);
    }

    #[test]
    fn serializes_back_to_the_same_shape() {
        let record: TelemetryRecord = serde_json::from_value(drone()).unwrap();
        assert_eq!(serde_json::to_value(&record).unwrap(), drone());
    }

    #[test]
    fn numeric_charge_level_is_kept_numeric() {
        let mut value = drone();
        value["status"]["chargeStatus"] = json!(0.8);
        let record: TelemetryRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.status.charge_status, ChargeStatus::Level(0.8));
        assert_eq!(
            serde_json::to_value(&record).unwrap()["status"]["chargeStatus"],
            json!(0.8)
        );
    }

    #[test]
    fn rejects_incomplete_records() {
        let mut value = drone();
        value["status"].as_object_mut().unwrap().remove("voltage");
        assert!(serde_json::from_value::<TelemetryRecord>(value).is_err());
    }

    #[test]
    fn rejects_wrong_types() {
        let mut value = drone();
        value["temp"] = json!("warm");
        assert!(serde_json::from_value::<TelemetryRecord>(value).is_err());

        let mut value = drone();
        value["status"]["payloadPower"] = json!(1);
        assert!(serde_json::from_value::<TelemetryRecord>(value).is_err());
    }

    #[test]
    fn ignores_unknown_fields() {
        let mut value = drone();
        value["firmware"] = json!("1.2.3");
        assert!(serde_json::from_value::<TelemetryRecord>(value).is_ok());
    }
}
