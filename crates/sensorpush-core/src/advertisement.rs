//! SensorPush advertisement decoding.
//!
//! SensorPush sensors broadcast their latest measurement in the manufacturer
//! data of every advertisement, so readings can be collected without a
//! connection. The 16-bit "company id" is not a real company id: it carries
//! the first two bytes of the payload.
//!
//! # Format
//!
//! After re-prefixing the payload with the company id (little-endian):
//!
//! - bits 0-1 of byte 0: page id (only page 0 carries measurements)
//! - bits 2-7 of byte 0: device type id, offset by 64
//! - bytes 1..: a little-endian packed integer holding the measurements as
//!   mixed-radix fields, each defined by `(min, max, step)`

use sensorpush_types::{DeviceType, RawAdvertisement};

use crate::error::{Error, Result};

/// Offset added to the 6-bit type field of page 0.
const DEVICE_TYPE_BASE: u8 = 64;

/// Largest packed value that fits the decoder's accumulator.
const MAX_PACKED_BYTES: usize = 16;

/// `(min, max, step)` for a packed measurement field.
type FieldParams = (f64, f64, f64);

const HT1_TEMPERATURE: FieldParams = (-40.0, 140.0, 0.0025);
const TEMPERATURE: FieldParams = (-40.0, 125.0, 0.0025);
const HUMIDITY: FieldParams = (0.0, 100.0, 0.0025);
/// Barometric pressure, in Pa.
const PRESSURE: FieldParams = (30000.0, 125000.0, 1.0);

/// Measurements decoded from one advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorAdvertisement {
    /// Detected hardware model.
    pub device_type: DeviceType,
    /// Temperature in degrees Celsius.
    pub temperature_c: Option<f64>,
    /// Relative humidity percentage.
    pub humidity_percent: Option<f64>,
    /// Barometric pressure in hPa (HTP.xw only).
    pub pressure_hpa: Option<f64>,
}

impl SensorAdvertisement {
    /// An advertisement identified as SensorPush but carrying no readings.
    pub fn without_readings(device_type: DeviceType) -> Self {
        Self {
            device_type,
            temperature_c: None,
            humidity_percent: None,
            pressure_hpa: None,
        }
    }

    /// Temperature and humidity, if both are present.
    pub fn climate(&self) -> Option<(f64, f64)> {
        self.temperature_c.zip(self.humidity_percent)
    }
}

/// Recognise a SensorPush advertisement and decode its readings.
///
/// Returns `None` for advertisements from other devices. Manufacturer entries
/// are tried in ascending company-id order and the first one that decodes
/// wins. A device whose name identifies it as a SensorPush but whose payload
/// does not decode is still recognised, without readings.
pub fn parse_advertisement(adv: &RawAdvertisement) -> Option<SensorAdvertisement> {
    let named_type = adv.display_name.as_deref().and_then(DeviceType::from_name);

    // A foreign local name means a foreign device, whatever its payload says.
    if adv.display_name.as_deref().is_some_and(|n| !n.trim().is_empty()) && named_type.is_none() {
        return None;
    }

    let mut company_ids: Vec<u16> = adv.manufacturer_payload.keys().copied().collect();
    company_ids.sort_unstable();

    for company_id in company_ids {
        let Some(data) = adv.manufacturer_payload.get(&company_id) else {
            continue;
        };
        if let Ok(decoded) = decode_manufacturer_data(company_id, data) {
            return Some(decoded);
        }
    }

    named_type.map(SensorAdvertisement::without_readings)
}

/// Decode one manufacturer data entry.
///
/// # Arguments
///
/// * `company_id` - The 16-bit key of the manufacturer data entry
/// * `data` - The bytes following the company id
pub fn decode_manufacturer_data(company_id: u16, data: &[u8]) -> Result<SensorAdvertisement> {
    let mut payload = Vec::with_capacity(data.len() + 2);
    payload.extend_from_slice(&company_id.to_le_bytes());
    payload.extend_from_slice(data);

    let header = payload[0];
    let page_id = header & 0x03;
    if page_id != 0 {
        return Err(Error::InvalidData(format!(
            "Unsupported advertisement page {}",
            page_id
        )));
    }

    let device_type = DeviceType::try_from(DEVICE_TYPE_BASE + (header >> 2))?;

    let packed_bytes = &payload[1..];
    let required = packed_len(device_type);
    if packed_bytes.len() < required {
        return Err(Error::InvalidReadingFormat {
            expected: required + 1,
            actual: payload.len(),
        });
    }
    if packed_bytes.len() > MAX_PACKED_BYTES {
        return Err(Error::InvalidData(format!(
            "Advertisement payload too long: {} bytes",
            payload.len()
        )));
    }

    let packed = packed_bytes
        .iter()
        .enumerate()
        .fold(0u128, |acc, (i, b)| acc | (u128::from(*b) << (8 * i)));

    let values = unpack_fields(packed, field_params(device_type));

    Ok(SensorAdvertisement {
        device_type,
        temperature_c: values.first().copied(),
        humidity_percent: values.get(1).copied(),
        pressure_hpa: values.get(2).map(|pa| round2(pa / 100.0)),
    })
}

/// Encode readings into a manufacturer data entry, the inverse of
/// [`decode_manufacturer_data`].
///
/// Used to simulate sensors. Every field the model carries must be present
/// and within its range.
pub fn encode_manufacturer_data(adv: &SensorAdvertisement) -> Result<(u16, Vec<u8>)> {
    let params = field_params(adv.device_type);
    let readings = [
        adv.temperature_c,
        adv.humidity_percent,
        adv.pressure_hpa.map(|hpa| hpa * 100.0),
    ];

    let mut packed: u128 = 0;
    let mut multiplier: u128 = 1;
    for (&(min, max, step), reading) in params.iter().zip(readings) {
        let value = reading
            .ok_or_else(|| Error::InvalidData(format!("{} requires every field", adv.device_type)))?;
        if !(min..=max).contains(&value) {
            return Err(Error::InvalidData(format!(
                "Value {} outside {}..={}",
                value, min, max
            )));
        }
        let count = ((value - min) / step).round() as u128;
        packed += count * multiplier;
        multiplier *= u128::from(field_steps((min, max, step)));
    }

    let mut payload = vec![(adv.device_type.id() - DEVICE_TYPE_BASE) << 2];
    let len = packed_len(adv.device_type);
    payload.extend((0..len).map(|i| (packed >> (8 * i)) as u8));

    let company_id = u16::from_le_bytes([payload[0], payload[1]]);
    Ok((company_id, payload[2..].to_vec()))
}

fn field_params(device_type: DeviceType) -> &'static [FieldParams] {
    match device_type {
        DeviceType::Ht1 => &[HT1_TEMPERATURE, HUMIDITY],
        DeviceType::HtW => &[TEMPERATURE, HUMIDITY],
        DeviceType::HtpXw => &[TEMPERATURE, HUMIDITY, PRESSURE],
    }
}

/// Number of packed bytes needed to hold every field of a model.
fn packed_len(device_type: DeviceType) -> usize {
    let range: u128 = field_params(device_type)
        .iter()
        .map(|p| u128::from(field_steps(*p)))
        .product();
    let bits = 128 - (range - 1).leading_zeros() as usize;
    bits.div_ceil(8)
}

/// Count of distinct values a field can take.
fn field_steps((min, max, step): FieldParams) -> u64 {
    ((max - min) / step + step / 2.0) as u64 + 1
}

fn unpack_fields(packed: u128, params: &[FieldParams]) -> Vec<f64> {
    let mut modulus: u128 = 1;
    let mut divisor: u128 = 1;
    let mut values = Vec::with_capacity(params.len());

    for &(min, max, step) in params {
        let steps = u128::from(field_steps((min, max, step)));
        modulus *= steps;
        let count = (packed % modulus) / divisor;
        values.push(round2(count as f64 * step + min));
        divisor *= steps;
    }

    values
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(device_type: DeviceType, readings: &[f64]) -> (u16, Vec<u8>) {
        let adv = SensorAdvertisement {
            device_type,
            temperature_c: readings.first().copied(),
            humidity_percent: readings.get(1).copied(),
            pressure_hpa: readings.get(2).map(|pa| pa / 100.0),
        };
        encode_manufacturer_data(&adv).unwrap()
    }

    #[test]
    fn test_decode_ht_w() {
        let (id, data) = encode(DeviceType::HtW, &[23.5, 45.2]);
        let decoded = decode_manufacturer_data(id, &data).unwrap();

        assert_eq!(decoded.device_type, DeviceType::HtW);
        assert_eq!(decoded.temperature_c, Some(23.5));
        assert_eq!(decoded.humidity_percent, Some(45.2));
        assert_eq!(decoded.pressure_hpa, None);
        assert_eq!(decoded.climate(), Some((23.5, 45.2)));
    }

    #[test]
    fn test_decode_ht1_negative_temperature() {
        let (id, data) = encode(DeviceType::Ht1, &[-12.25, 88.0]);
        let decoded = decode_manufacturer_data(id, &data).unwrap();

        assert_eq!(decoded.device_type, DeviceType::Ht1);
        assert_eq!(decoded.temperature_c, Some(-12.25));
        assert_eq!(decoded.humidity_percent, Some(88.0));
    }

    #[test]
    fn test_decode_htp_xw_pressure() {
        let (id, data) = encode(DeviceType::HtpXw, &[19.75, 60.5, 101_325.0]);
        let decoded = decode_manufacturer_data(id, &data).unwrap();

        assert_eq!(decoded.device_type, DeviceType::HtpXw);
        assert_eq!(decoded.temperature_c, Some(19.75));
        assert_eq!(decoded.humidity_percent, Some(60.5));
        assert_eq!(decoded.pressure_hpa, Some(1013.25));
    }

    #[test]
    fn test_decode_rejects_other_pages() {
        let result = decode_manufacturer_data(0x0001, &[0, 0, 0, 0]);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        // type field 5 -> id 69
        let result = decode_manufacturer_data(0x0014, &[0, 0, 0, 0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let result = decode_manufacturer_data(0x0004, &[0x01]);
        assert!(matches!(result, Err(Error::InvalidReadingFormat { .. })));
    }

    #[test]
    fn test_parse_advertisement_with_readings() {
        let (id, data) = encode(DeviceType::HtW, &[21.0, 40.0]);
        let adv = RawAdvertisement::new("AA:BB")
            .with_name("HT.w 0C3")
            .with_manufacturer_data(id, data);

        let parsed = parse_advertisement(&adv).unwrap();
        assert_eq!(parsed.climate(), Some((21.0, 40.0)));
    }

    #[test]
    fn test_parse_advertisement_unnamed() {
        let (id, data) = encode(DeviceType::Ht1, &[5.0, 50.0]);
        let adv = RawAdvertisement::new("AA:BB").with_manufacturer_data(id, data);

        let parsed = parse_advertisement(&adv).unwrap();
        assert_eq!(parsed.device_type, DeviceType::Ht1);
    }

    #[test]
    fn test_parse_advertisement_name_only() {
        let adv = RawAdvertisement::new("AA:BB").with_name("SensorPush HT1");

        let parsed = parse_advertisement(&adv).unwrap();
        assert_eq!(parsed.device_type, DeviceType::Ht1);
        assert_eq!(parsed.climate(), None);

        let adv = RawAdvertisement::new("CC:DD").with_name("SensorPush HT.w 0CA1");
        let parsed = parse_advertisement(&adv).unwrap();
        assert_eq!(parsed.device_type, DeviceType::HtW);
    }

    #[test]
    fn test_parse_advertisement_foreign_device() {
        let (id, data) = encode(DeviceType::Ht1, &[5.0, 50.0]);
        let adv = RawAdvertisement::new("AA:BB")
            .with_name("Headphones 12")
            .with_manufacturer_data(id, data);
        assert!(parse_advertisement(&adv).is_none());

        let adv = RawAdvertisement::new("CC:DD").with_manufacturer_data(0x004C, vec![0x02, 0x15]);
        assert!(parse_advertisement(&adv).is_none());
    }

    #[test]
    fn test_encode_rejects_missing_and_out_of_range() {
        let missing = SensorAdvertisement::without_readings(DeviceType::HtW);
        assert!(encode_manufacturer_data(&missing).is_err());

        let hot = SensorAdvertisement {
            temperature_c: Some(130.0),
            humidity_percent: Some(50.0),
            ..SensorAdvertisement::without_readings(DeviceType::HtW)
        };
        assert!(encode_manufacturer_data(&hot).is_err());

        // HT1 has a wider temperature range
        let hot_ht1 = SensorAdvertisement {
            device_type: DeviceType::Ht1,
            ..hot
        };
        assert!(encode_manufacturer_data(&hot_ht1).is_ok());
    }

    #[test]
    fn test_packed_len() {
        assert_eq!(packed_len(DeviceType::Ht1), 4);
        assert_eq!(packed_len(DeviceType::HtW), 4);
        assert_eq!(packed_len(DeviceType::HtpXw), 6);
    }
}
