//! OBD-II response encoding
//!
//! Maps a normalized mode+PID request to the space-separated hex payload an
//! ELM327 adapter would relay from the ECU. Scaling follows SAE J1979 for
//! each PID (coolant offset 40, RPM quarter-counts, percentages over 255).
//! Unsupported requests encode as the literal `NO DATA` sentinel.

use crate::diagnostics::encode_dtc;
use crate::protocol::NO_DATA;
use crate::telemetry::TelemetrySnapshot;

/// Encode a mode+PID request against the given snapshot.
///
/// `request` must already be normalized (uppercase, no separators). This is
/// a pure read of the snapshot; the mode 04 clear happens in the interpreter
/// before this is called, so the `04` arm only produces the ack.
pub fn encode_request(snapshot: &TelemetrySnapshot, request: &str) -> String {
    match request {
        // Mode 01, current data
        "0100" => "41 00 BE 1F B8 10".to_string(), // PIDs supported 01-20
        "0101" => {
            // Monitor status: MIL bit set while confirmed codes exist
            let status = if snapshot.diagnostics.active.is_empty() {
                "07"
            } else {
                "82"
            };
            format!("41 01 {status} 07 65 04")
        }
        "0102" => match snapshot.diagnostics.active.first() {
            Some(code) => format!("41 02 {}", dtc_pair(code)),
            None => "41 02 00 00".to_string(),
        },
        "0103" => format!("41 03 {:02X}", snapshot.fuel_system_status.encoding()),
        "0104" => format!("41 04 {:02X}", (snapshot.engine_load * 2.55) as u32),
        "0105" => format!("41 05 {:02X}", (snapshot.coolant_temp + 40.0) as u32),
        "0106" => "41 06 80".to_string(), // short term fuel trim, 0%
        "0107" => "41 07 80".to_string(), // long term fuel trim, 0%
        "010A" => format!("41 0A {:02X}", (snapshot.fuel_pressure / 3.0) as u32),
        "010B" => format!("41 0B {:02X}", snapshot.manifold_pressure as u32),
        "010C" => word("41 0C", (snapshot.engine_rpm * 4.0) as u16),
        "010D" => format!("41 0D {:02X}", snapshot.vehicle_speed as u32),
        "010E" => "41 0E 80".to_string(), // timing advance, 0 degrees
        "010F" => format!("41 0F {:02X}", (snapshot.intake_air_temp + 40.0) as u32),
        "0110" => word("41 10", (snapshot.engine_load / 100.0 * 655.35) as u16),
        "0111" => format!("41 11 {:02X}", (snapshot.throttle_position * 2.55) as u32),
        "0112" => "41 12 01".to_string(), // secondary air upstream
        "0113" => "41 13 03".to_string(), // bank 1 sensors 1 and 2 present
        "0114" => format!("41 14 {:02X} FF", (snapshot.oxygen_sensor_1 * 200.0) as u32),
        "0115" => format!("41 15 {:02X} FF", (snapshot.oxygen_sensor_2 * 200.0) as u32),
        "011F" => word("41 1F", snapshot.engine_run_time as u16),
        "0120" => "41 20 80 05 B0 15".to_string(), // PIDs supported 21-40
        "0121" => "41 21 00 00".to_string(),       // distance with MIL on
        "0122" => word("41 22", (snapshot.fuel_pressure * 0.079) as u16),
        "0123" => word("41 23", (snapshot.fuel_pressure * 10.0) as u16),
        "012F" => format!("41 2F {:02X}", (snapshot.fuel_level * 2.55) as u32),
        "0131" => "41 31 00 00".to_string(), // distance since codes cleared
        "0140" => "41 40 48 00 00 10".to_string(), // PIDs supported 41-60
        "0142" => word("41 42", (snapshot.battery_voltage * 1000.0) as u16),
        "0151" => format!("41 51 {:02X}", snapshot.profile.fuel_type_byte()),

        // Mode 03, confirmed trouble codes
        "03" => dtc_list("43", &snapshot.diagnostics.active),

        // Mode 04, clear ack (the state change happened upstream)
        "04" => "44".to_string(),

        // Mode 07, pending trouble codes
        "07" => dtc_list("47", &snapshot.diagnostics.pending),

        // Mode 09, vehicle information
        "0900" => "49 00 54 40 00 00".to_string(),
        "0902" => "49 02 01 31 47 43 34 44 35 39 45 46 31 32 33 34 35 36 37".to_string(),
        "090A" => "49 0A 01 45 4C 4D 33 32 37 00 00 00 00 00 00 00 00 00 00 00".to_string(),

        _ => NO_DATA.to_string(),
    }
}

fn word(prefix: &str, value: u16) -> String {
    format!("{prefix} {:02X} {:02X}", value >> 8, value & 0xFF)
}

fn dtc_pair(code: &str) -> String {
    let (high, low) = encode_dtc(code);
    format!("{high:02X} {low:02X}")
}

fn dtc_list(header: &str, codes: &[String]) -> String {
    if codes.is_empty() {
        return format!("{header} 00");
    }
    let mut response = format!("{header} {:02X}", codes.len());
    for code in codes {
        response.push(' ');
        response.push_str(&dtc_pair(code));
    }
    response
}
