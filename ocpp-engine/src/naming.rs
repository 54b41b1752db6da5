//! Wire naming <-> internal naming
//!
//! OCPP payloads use camelCase keys on the wire. Internally payloads are plain
//! serde structs with snake_case fields, so every key crossing the boundary is
//! renamed. Only mapping keys change: values, list elements and scalars pass
//! through untouched, at any nesting depth.
//!
//! ## Exception tables
//!
//! The protocol spells a few acronyms irregularly, so both directions carry a
//! fixed table that is applied in this order:
//!
//! | Direction          | Stage                   | Rule                                   |
//! |--------------------|-------------------------|----------------------------------------|
//! | wire -> internal   | 1. verbatim, before split | `ocppCSMSURL` -> `ocpp_csms_url`     |
//! |                    |                         | `V2X` -> `_v2x`, `V2G` -> `_v2g`       |
//! | internal -> wire   | 1. whole key            | `ocpp_csms_url` -> `ocppCsmsUrl`       |
//! |                    |                         | `soc_limit_reached` -> `SOCLimitReached` |
//! |                    | 2. per component        | `soc` -> `SoC`, `url` -> `URL`,        |
//! |                    |                         | `v2x` -> `V2X`, `v2g` -> `V2G`         |
//! |                    |                         | `csms` -> `CSMS` (also when first)     |
//!
//! Whole-key rules win, so the `url` rule never sees `ocpp_csms_url`.
//! Component rules match whole components only: `socket` stays `Socket` and
//! `associated` is never touched.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::OcppError;

/// Substring replacements applied to wire keys before splitting words
const INTERNAL_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("ocppCSMSURL", "ocpp_csms_url"),
    ("V2X", "_v2x"),
    ("V2G", "_v2g"),
];

/// Internal keys whose wire spelling cannot be derived word by word
const WIRE_KEY_EXCEPTIONS: &[(&str, &str)] = &[
    ("ocpp_csms_url", "ocppCsmsUrl"),
    ("soc_limit_reached", "SOCLimitReached"),
];

/// Components that are acronyms on the wire (never applied to the first
/// component, except `csms`)
const WIRE_ACRONYMS: &[(&str, &str)] = &[
    ("soc", "SoC"),
    ("url", "URL"),
    ("v2x", "V2X"),
    ("v2g", "V2G"),
    ("csms", "CSMS"),
];

/// Convert one wire key (`chargePointVendor`) to internal naming
/// (`charge_point_vendor`)
pub fn to_internal_key(key: &str) -> String {
    let mut key = key.to_string();
    for (from, to) in INTERNAL_SUBSTITUTIONS {
        key = key.replace(from, to);
    }

    let chars: Vec<char> = key.chars().collect();
    let split = split_before_words(&chars);
    let split = split_before_capitals(&split);

    split.into_iter().collect::<String>().to_lowercase()
}

/// Insert `_` between any character and a following capitalized word
/// (`ABcDe` -> `A_BcDe`). Matches are consumed left to right and never overlap.
fn split_before_words(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len() + 4);
    let mut i = 0;

    while i < chars.len() {
        let starts_word = chars[i] != '\n'
            && i + 2 < chars.len()
            && chars[i + 1].is_ascii_uppercase()
            && chars[i + 2].is_ascii_lowercase();

        if starts_word {
            let mut end = i + 2;
            while end < chars.len() && chars[end].is_ascii_lowercase() {
                end += 1;
            }
            out.push(chars[i]);
            out.push('_');
            out.extend_from_slice(&chars[i + 1..end]);
            i = end;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}

/// Insert `_` between a lowercase letter or digit and a following capital,
/// provided the capital is not the last character (`idTag` -> `id_Tag`,
/// `targetSoC` stays).
fn split_before_capitals(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len() + 4);
    let mut i = 0;

    while i < chars.len() {
        let boundary = (chars[i].is_ascii_lowercase() || chars[i].is_ascii_digit())
            && i + 2 < chars.len()
            && chars[i + 1].is_ascii_uppercase()
            && !chars[i + 2].is_whitespace();

        if boundary {
            out.push(chars[i]);
            out.push('_');
            out.push(chars[i + 1]);
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}

/// Convert one internal key (`charge_point_vendor`) to wire naming
/// (`chargePointVendor`)
pub fn to_wire_key(key: &str) -> String {
    if let Some((_, wire)) = WIRE_KEY_EXCEPTIONS.iter().find(|(internal, _)| *internal == key) {
        return wire.to_string();
    }

    let mut out = String::with_capacity(key.len());
    for (index, component) in key.split('_').enumerate() {
        let acronym = WIRE_ACRONYMS
            .iter()
            .find(|(word, _)| *word == component && (index > 0 || *word == "csms"))
            .map(|(_, wire)| *wire);

        match acronym {
            Some(wire) => out.push_str(wire),
            None if index == 0 => out.push_str(component),
            None => {
                let mut chars = component.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(chars.as_str());
                }
            }
        }
    }

    out
}

/// Rename every mapping key, recursively, from wire to internal naming
pub fn to_internal_naming(value: Value) -> Value {
    rename_keys(value, &to_internal_key)
}

/// Rename every mapping key, recursively, from internal to wire naming
pub fn to_wire_naming(value: Value) -> Value {
    rename_keys(value, &to_wire_key)
}

fn rename_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (rename(&key), rename_keys(value, rename)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rename_keys(v, rename)).collect())
        }
        other => other,
    }
}

/// Flatten a typed payload into a plain JSON tree
pub fn serialize_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Value, OcppError> {
    Ok(serde_json::to_value(payload)?)
}

/// Drop every absent value (`null`) from mappings and lists, recursively.
///
/// Present-but-falsy values (`0`, `""`, `false`, `[]`, `{}`) are kept.
pub fn remove_absent(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, remove_absent(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(remove_absent)
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Wire keys and their internal spelling, exceptions included
    const KEY_PAIRS: &[(&str, &str)] = &[
        ("chargePointVendor", "charge_point_vendor"),
        ("evseId", "evse_id"),
        ("idTokenInfo", "id_token_info"),
        ("currentTime", "current_time"),
        ("heartbeatInterval", "heartbeat_interval"),
        ("webSocketPingInterval", "web_socket_ping_interval"),
        ("ocppCsmsUrl", "ocpp_csms_url"),
        ("responderURL", "responder_url"),
        ("targetSoC", "target_soc"),
        ("SOCLimitReached", "soc_limit_reached"),
        ("CSMSRootCertificate", "csms_root_certificate"),
        ("evMaxV2XEnergyRequest", "ev_max_v2x_energy_request"),
        ("V2XChargingParameters", "_v2x_charging_parameters"),
        ("V2GCertificateChain", "_v2g_certificate_chain"),
        ("v2xChargingParameters", "v2x_charging_parameters"),
        ("status", "status"),
    ];

    #[test]
    fn test_to_internal_key() {
        for (wire, internal) in KEY_PAIRS {
            assert_eq!(to_internal_key(wire), *internal, "wire key {}", wire);
        }
    }

    #[test]
    fn test_to_wire_key() {
        for (wire, internal) in KEY_PAIRS {
            assert_eq!(to_wire_key(internal), *wire, "internal key {}", internal);
        }
    }

    #[test]
    fn test_key_round_trip() {
        for (wire, internal) in KEY_PAIRS {
            assert_eq!(to_wire_key(&to_internal_key(wire)), *wire);
            assert_eq!(to_internal_key(&to_wire_key(internal)), *internal);
        }
    }

    #[test]
    fn test_legacy_csms_url_spelling() {
        assert_eq!(to_internal_key("ocppCSMSURL"), "ocpp_csms_url");
    }

    #[test]
    fn test_acronyms_match_whole_components_only() {
        assert_eq!(to_wire_key("associated_token"), "associatedToken");
        assert_eq!(to_wire_key("socket_id"), "socketId");
        assert_eq!(to_wire_key("curl_count"), "curlCount");
    }

    #[test]
    fn test_trailing_capital_is_not_split() {
        assert_eq!(to_internal_key("phaseL"), "phasel");
        assert_eq!(to_internal_key("limitL2"), "limit_l2");
    }

    #[test]
    fn test_nested_round_trip() {
        let wire = json!({
            "chargingStation": {
                "vendorName": "EK",
                "modem": { "iccid": "89", "imsi": "001" }
            },
            "meterValue": [
                {
                    "sampledValue": [
                        { "unitOfMeasure": { "unit": "Wh" }, "value": 12.5 },
                        { "targetSoC": 80 }
                    ]
                }
            ],
            "ocppCsmsUrl": "wss://csms.example/ocpp",
            "tags": ["chargingStation", 1, null]
        });

        let internal = to_internal_naming(wire.clone());
        assert_eq!(
            internal,
            json!({
                "charging_station": {
                    "vendor_name": "EK",
                    "modem": { "iccid": "89", "imsi": "001" }
                },
                "meter_value": [
                    {
                        "sampled_value": [
                            { "unit_of_measure": { "unit": "Wh" }, "value": 12.5 },
                            { "target_soc": 80 }
                        ]
                    }
                ],
                "ocpp_csms_url": "wss://csms.example/ocpp",
                "tags": ["chargingStation", 1, null]
            })
        );

        assert_eq!(to_wire_naming(internal), wire);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(to_internal_naming(json!("someValue")), json!("someValue"));
        assert_eq!(to_wire_naming(json!([1, "a_b"])), json!([1, "a_b"]));
    }

    #[test]
    fn test_remove_absent() {
        let value = json!({
            "status": "Accepted",
            "status_info": null,
            "interval": 0,
            "reason": "",
            "flag": false,
            "items": [1, null, { "a": null, "b": [] }]
        });

        assert_eq!(
            remove_absent(value),
            json!({
                "status": "Accepted",
                "interval": 0,
                "reason": "",
                "flag": false,
                "items": [1, { "b": [] }]
            })
        );
    }

    #[test]
    fn test_serialize_unset_option_is_stripped() {
        #[derive(Serialize)]
        struct StatusInfo {
            reason_code: String,
            additional_info: Option<String>,
        }

        let unset = StatusInfo {
            reason_code: "Unknown".into(),
            additional_info: None,
        };
        let set_empty = StatusInfo {
            reason_code: "Unknown".into(),
            additional_info: Some(String::new()),
        };

        let unset = remove_absent(serialize_payload(&unset).unwrap());
        assert_eq!(unset, json!({ "reason_code": "Unknown" }));

        let set_empty = remove_absent(serialize_payload(&set_empty).unwrap());
        assert_eq!(
            set_empty,
            json!({ "reason_code": "Unknown", "additional_info": "" })
        );
    }
}
