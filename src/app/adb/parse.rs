use crate::app::models::DeviceSummary;

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            Some(DeviceSummary {
                serial: tokens[0].to_string(),
                state: tokens[1].to_string(),
                model: tokens
                    .iter()
                    .skip(2)
                    .find_map(|token| token.strip_prefix("model:"))
                    .map(str::to_string),
            })
        })
        .collect()
}

/// Serials of devices that are authorized and ready for `install`.
pub fn online_serials(devices: &[DeviceSummary]) -> Vec<String> {
    devices
        .iter()
        .filter(|device| device.is_online())
        .map(|device| device.serial.clone())
        .collect()
}
