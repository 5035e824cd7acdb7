// Typed views over the Miele API JSON documents.
//
// The API wraps most scalar readings in `{value_raw, value_localized}`
// pairs and omits keys that don't apply to a given appliance category, so
// nearly everything here is optional with serde defaults. Unknown fields
// are captured in `extra` maps rather than silently dropped.

use serde::{Deserialize, Serialize};

/// A `{value_raw, value_localized}` code pair, the API's unit of
/// enumerated state (status, program id, program phase, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeValue {
    #[serde(default)]
    pub value_raw: Option<i64>,
    #[serde(default)]
    pub value_localized: Option<serde_json::Value>,
    #[serde(default)]
    pub key_localized: Option<String>,
}

impl CodeValue {
    /// The raw code, or 0 when the API omitted it.
    pub fn raw(&self) -> i64 {
        self.value_raw.unwrap_or(0)
    }

    /// The localized text, or `""` when absent or non-textual.
    pub fn localized(&self) -> &str {
        self.value_localized
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
    }
}

/// A temperature reading. `value_raw` is in centi-degrees; `-32768`
/// means "not available" on most appliance categories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Temperature {
    #[serde(default)]
    pub value_raw: Option<i64>,
    #[serde(default)]
    pub value_localized: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

// ── Device ident ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentLabel {
    #[serde(default)]
    pub fab_number: String,
    #[serde(default)]
    pub fab_index: String,
    #[serde(default)]
    pub tech_type: String,
    #[serde(default)]
    pub mat_number: String,
    #[serde(default)]
    pub swids: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XkmIdentLabel {
    #[serde(default)]
    pub tech_type: String,
    #[serde(default)]
    pub release_version: String,
}

/// Identity block of a device: appliance type, names, serial labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdent {
    #[serde(rename = "type", default)]
    pub device_type: CodeValue,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub protocol_version: Option<i64>,
    #[serde(default)]
    pub device_ident_label: DeviceIdentLabel,
    #[serde(default)]
    pub xkm_ident_label: XkmIdentLabel,
}

// ── Device state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnable {
    #[serde(default)]
    pub full_remote_control: Option<bool>,
    #[serde(default)]
    pub smart_grid: Option<bool>,
    #[serde(default)]
    pub mobile_start: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumptionValue {
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Live consumption data and forecasts, present on appliances that
/// report eco feedback (washers, dishwashers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcoFeedback {
    #[serde(default)]
    pub current_water_consumption: Option<ConsumptionValue>,
    #[serde(default)]
    pub current_energy_consumption: Option<ConsumptionValue>,
    #[serde(default)]
    pub water_forecast: Option<f64>,
    #[serde(default)]
    pub energy_forecast: Option<f64>,
}

/// State block of a device, as pushed over the event stream and returned
/// by `GET /devices`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    #[serde(default)]
    pub status: CodeValue,
    // Capitalized in API data.
    #[serde(rename = "ProgramID", default)]
    pub program_id: CodeValue,
    #[serde(default)]
    pub program_type: CodeValue,
    #[serde(default)]
    pub program_phase: CodeValue,
    /// `[hours, minutes]`
    #[serde(default)]
    pub remaining_time: Vec<i64>,
    /// `[hours, minutes]`
    #[serde(default)]
    pub start_time: Vec<i64>,
    /// `[hours, minutes]`
    #[serde(default)]
    pub elapsed_time: Vec<i64>,
    #[serde(default)]
    pub target_temperature: Vec<Temperature>,
    #[serde(default)]
    pub core_target_temperature: Vec<Temperature>,
    #[serde(default)]
    pub temperature: Vec<Temperature>,
    #[serde(default)]
    pub core_temperature: Vec<Temperature>,
    #[serde(default)]
    pub signal_info: Option<bool>,
    #[serde(default)]
    pub signal_failure: Option<bool>,
    #[serde(default)]
    pub signal_door: Option<bool>,
    #[serde(default)]
    pub remote_enable: RemoteEnable,
    #[serde(default)]
    pub ambient_light: Option<i64>,
    #[serde(default)]
    pub light: Option<i64>,
    #[serde(default)]
    pub spinning_speed: CodeValue,
    #[serde(default)]
    pub drying_step: CodeValue,
    #[serde(default)]
    pub ventilation_step: CodeValue,
    #[serde(default)]
    pub plate_step: Vec<CodeValue>,
    #[serde(default)]
    pub eco_feedback: Option<EcoFeedback>,
    #[serde(default)]
    pub battery_level: Option<i64>,
    /// Remaining fields the API sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single device document from `GET /devices` (keyed by serial) or
/// `GET /devices/{serial}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub ident: DeviceIdent,
    #[serde(default)]
    pub state: DeviceState,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Device {
    /// The fabrication (serial) number.
    pub fn fab_number(&self) -> &str {
        &self.ident.device_ident_label.fab_number
    }

    /// The raw appliance-type code.
    pub fn device_type(&self) -> i64 {
        self.ident.device_type.raw()
    }

    /// The user-assigned device name, falling back to the tech type
    /// when no name is set.
    pub fn name(&self) -> &str {
        if self.ident.device_name.is_empty() {
            &self.ident.device_ident_label.tech_type
        } else {
            &self.ident.device_name
        }
    }
}

// ── Actions ──────────────────────────────────────────────────────────

/// A settable target-temperature range offered by the actions document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionTargetTemperature {
    #[serde(default)]
    pub zone: Option<i64>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

/// The actions a device currently accepts, from
/// `GET /devices/{serial}/actions`.
///
/// Empty vectors and `false` flags mean the action is unavailable in the
/// device's current state, not that the device lacks the capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceActions {
    #[serde(default)]
    pub process_action: Vec<i64>,
    #[serde(default)]
    pub light: Vec<i64>,
    #[serde(default)]
    pub ambient_light: Vec<i64>,
    #[serde(default)]
    pub start_time: Vec<serde_json::Value>,
    #[serde(default)]
    pub ventilation_step: Vec<i64>,
    #[serde(default)]
    pub program_id: Vec<i64>,
    #[serde(default)]
    pub run_on_time: Vec<i64>,
    #[serde(default)]
    pub target_temperature: Vec<ActionTargetTemperature>,
    #[serde(default)]
    pub modes: Vec<i64>,
    #[serde(default)]
    pub power_on: bool,
    #[serde(default)]
    pub power_off: bool,
    #[serde(default)]
    pub device_name: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Programs ─────────────────────────────────────────────────────────

/// One entry from `GET /devices/{serial}/programs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramAvailable {
    #[serde(default)]
    pub program_id: Option<i64>,
    /// Localized program name.
    #[serde(default)]
    pub program: Option<String>,
    /// Program parameters (temperature/duration ranges); shape varies by
    /// appliance category.
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn deserialize_device_document() {
        let json = serde_json::json!({
            "ident": {
                "type": { "key_localized": "Device type", "value_raw": 1, "value_localized": "Washing machine" },
                "deviceName": "Basement washer",
                "protocolVersion": 4,
                "deviceIdentLabel": {
                    "fabNumber": "000123456789",
                    "fabIndex": "44",
                    "techType": "WWV980",
                    "matNumber": "11387290",
                    "swids": ["5975"]
                },
                "xkmIdentLabel": { "techType": "EK057", "releaseVersion": "08.32" }
            },
            "state": {
                "status": { "value_raw": 5, "value_localized": "In use", "key_localized": "status" },
                "ProgramID": { "value_raw": 1, "value_localized": "Cottons", "key_localized": "Program name" },
                "programType": { "value_raw": 1, "value_localized": "Own programme" },
                "programPhase": { "value_raw": 260, "value_localized": "Main wash" },
                "remainingTime": [1, 59],
                "startTime": [0, 0],
                "elapsedTime": [0, 22],
                "targetTemperature": [{ "value_raw": 4000, "value_localized": 40.0, "unit": "Celsius" }],
                "temperature": [{ "value_raw": -32768, "value_localized": null, "unit": "Celsius" }],
                "signalInfo": false,
                "signalFailure": false,
                "signalDoor": true,
                "remoteEnable": { "fullRemoteControl": true, "smartGrid": false, "mobileStart": false },
                "spinningSpeed": { "value_raw": 1400, "value_localized": "1400", "key_localized": "Spin speed" },
                "ecoFeedback": {
                    "currentWaterConsumption": { "unit": "l", "value": 11.9 },
                    "currentEnergyConsumption": { "unit": "kWh", "value": 0.21 },
                    "waterForecast": 0.3,
                    "energyForecast": 0.5
                }
            }
        });

        let device: Device = serde_json::from_value(json).unwrap();

        assert_eq!(device.fab_number(), "000123456789");
        assert_eq!(device.device_type(), 1);
        assert_eq!(device.name(), "Basement washer");
        assert_eq!(device.state.status.raw(), 5);
        assert_eq!(device.state.status.localized(), "In use");
        assert_eq!(device.state.program_id.raw(), 1);
        assert_eq!(device.state.remaining_time, vec![1, 59]);
        assert_eq!(device.state.target_temperature[0].value_raw, Some(4000));
        assert_eq!(device.state.remote_enable.full_remote_control, Some(true));
        let eco = device.state.eco_feedback.as_ref().unwrap();
        assert_eq!(eco.current_water_consumption.as_ref().unwrap().value, Some(11.9));
        assert_eq!(eco.energy_forecast, Some(0.5));
    }

    #[test]
    fn device_name_falls_back_to_tech_type() {
        let json = serde_json::json!({
            "ident": {
                "deviceName": "",
                "deviceIdentLabel": { "techType": "KM7575", "fabNumber": "000987" }
            },
            "state": {}
        });

        let device: Device = serde_json::from_value(json).unwrap();
        assert_eq!(device.name(), "KM7575");
    }

    #[test]
    fn deserialize_actions_document() {
        let json = serde_json::json!({
            "processAction": [1, 2],
            "light": [],
            "ambientLight": [],
            "startTime": [],
            "ventilationStep": [],
            "programId": [24, 25],
            "targetTemperature": [{ "zone": 1, "min": 1, "max": 9 }],
            "deviceName": true,
            "powerOn": false,
            "powerOff": true,
            "modes": []
        });

        let actions: DeviceActions = serde_json::from_value(json).unwrap();

        assert_eq!(actions.process_action, vec![1, 2]);
        assert_eq!(actions.program_id, vec![24, 25]);
        assert_eq!(actions.target_temperature[0].zone, Some(1));
        assert!(actions.power_off);
        assert!(!actions.power_on);
        assert!(actions.device_name);
    }

    #[test]
    fn missing_state_keys_default() {
        let device: Device = serde_json::from_value(serde_json::json!({})).unwrap();

        assert_eq!(device.fab_number(), "");
        assert_eq!(device.state.status.raw(), 0);
        assert!(device.state.remaining_time.is_empty());
        assert!(device.state.eco_feedback.is_none());
        assert!(device.state.battery_level.is_none());
    }
}
