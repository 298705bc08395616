//! Interface codec – wire encoding of every payload the dispatcher handles.
//!
//! Typed records (PVA, geometry, ranger and fiducial data and config) are
//! carried as JSON.  [`Message`] payloads are opaque and travel as raw bytes.
//!
//! Size caps are enforced in both directions.  A record that exceeds a cap
//! is rejected with [`AvonError::OutOfBounds`]; it is never clamped, since a
//! truncated scan cannot be told apart from a genuinely smaller one.
//!
//! JSON has no spelling for NaN or infinity, so a record holding one is
//! rejected with [`AvonError::Malformed`] before it is encoded.
//!
//! Records whose `time` is `0` are stamped by the [`Clock`] during encoding.
//! A non-zero `time` is a backend capture time and is preserved.

use avon_types::{
    AvonError, Bounds, FIDUCIALS_DETECTED_MAX, FiducialConfig, FiducialScan, Geom, InterfaceConfig,
    InterfaceData, InterfaceKind, Message, Pva, RANGER_SAMPLES_MAX, RANGER_TRANSDUCERS_MAX,
    RangerConfig, RangerScan,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::clock::Clock;

/// How a [`Payload`] body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Opaque,
    /// No body (acknowledgement of a set operation).
    Empty,
}

impl Encoding {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Encoding::Json => Some("application/json"),
            Encoding::Opaque => Some("application/octet-stream"),
            Encoding::Empty => None,
        }
    }
}

/// An encoded response body together with the timestamp it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub time: u64,
    pub encoding: Encoding,
    pub body: Vec<u8>,
}

impl Payload {
    pub fn empty() -> Self {
        Self {
            time: 0,
            encoding: Encoding::Empty,
            body: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cap validation
// ─────────────────────────────────────────────────────────────────────────────

fn check_cap(what: &str, count: usize, max: usize) -> Result<(), AvonError> {
    if count > max {
        return Err(AvonError::OutOfBounds {
            what: what.to_string(),
            count,
            max,
        });
    }
    Ok(())
}

fn check_finite<'a>(what: &str, values: impl IntoIterator<Item = &'a f64>) -> Result<(), AvonError> {
    match values.into_iter().find(|v| !v.is_finite()) {
        Some(v) => Err(AvonError::Malformed(format!("{what} holds non-finite value {v}"))),
        None => Ok(()),
    }
}

fn check_fov(what: &str, fov: &[Bounds; 3]) -> Result<(), AvonError> {
    check_finite(what, fov.iter().flat_map(|b| [&b.min, &b.max]))
}

pub fn validate_pva(pva: &Pva) -> Result<(), AvonError> {
    check_finite("pva", pva.p.iter().chain(&pva.v).chain(&pva.a))
}

pub fn validate_geom(geom: &Geom) -> Result<(), AvonError> {
    check_finite("geometry", geom.pose.iter().chain(&geom.extent))
}

pub fn validate_ranger_scan(scan: &RangerScan) -> Result<(), AvonError> {
    check_cap("transducer", scan.transducers.len(), RANGER_TRANSDUCERS_MAX)?;
    check_finite("ranger pose", &scan.pose)?;
    for t in &scan.transducers {
        check_cap("sample", t.samples.len(), RANGER_SAMPLES_MAX)?;
        check_finite("transducer pose", &t.pose)?;
        check_finite(
            "ranger sample",
            t.samples
                .iter()
                .flat_map(|s| [&s.bearing, &s.azimuth, &s.range, &s.intensity]),
        )?;
    }
    Ok(())
}

pub fn validate_ranger_config(config: &RangerConfig) -> Result<(), AvonError> {
    check_cap("transducer", config.transducers.len(), RANGER_TRANSDUCERS_MAX)?;
    for t in &config.transducers {
        validate_geom(&t.geom)?;
        check_fov("ranger field of view", &t.fov)?;
    }
    Ok(())
}

pub fn validate_fiducial_scan(scan: &FiducialScan) -> Result<(), AvonError> {
    check_cap("fiducial", scan.fiducials.len(), FIDUCIALS_DETECTED_MAX)?;
    for f in &scan.fiducials {
        check_finite("fiducial pose", &f.pose)?;
        validate_geom(&f.geom)?;
    }
    Ok(())
}

pub fn validate_fiducial_config(config: &FiducialConfig) -> Result<(), AvonError> {
    check_fov("fiducial field of view", &config.fov)
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON helpers
// ─────────────────────────────────────────────────────────────────────────────

fn to_json<T: Serialize>(time: u64, value: &T) -> Result<Payload, AvonError> {
    let body = serde_json::to_vec(value).map_err(|e| AvonError::Malformed(e.to_string()))?;
    Ok(Payload {
        time,
        encoding: Encoding::Json,
        body,
    })
}

fn from_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AvonError> {
    serde_json::from_slice(body).map_err(|e| AvonError::Malformed(e.to_string()))
}

fn opaque(mut message: Message, clock: &mut Clock) -> Payload {
    let time = clock.stamp_if_unset(&mut message.time);
    Payload {
        time,
        encoding: Encoding::Opaque,
        body: message.payload,
    }
}

fn require_usable(kind: InterfaceKind) -> Result<(), AvonError> {
    if kind.is_usable() {
        Ok(())
    } else {
        Err(AvonError::InvalidInterface(kind.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Motion state
// ─────────────────────────────────────────────────────────────────────────────

pub fn encode_pva(mut pva: Pva, clock: &mut Clock) -> Result<Payload, AvonError> {
    validate_pva(&pva)?;
    let time = clock.stamp_if_unset(&mut pva.time);
    to_json(time, &pva)
}

pub fn decode_pva(body: &[u8]) -> Result<Pva, AvonError> {
    from_json(body)
}

pub fn encode_geom(mut geom: Geom, clock: &mut Clock) -> Result<Payload, AvonError> {
    validate_geom(&geom)?;
    let time = clock.stamp_if_unset(&mut geom.time);
    to_json(time, &geom)
}

pub fn decode_geom(body: &[u8]) -> Result<Geom, AvonError> {
    from_json(body)
}

// ─────────────────────────────────────────────────────────────────────────────
// Interface data / command / config
// ─────────────────────────────────────────────────────────────────────────────

/// Encode the result of a `get_data` callback.
///
/// # Errors
///
/// [`AvonError::OutOfBounds`] when any cap is exceeded and
/// [`AvonError::Malformed`] for a non-finite value; no partial payload is
/// produced.
pub fn encode_data(data: InterfaceData, clock: &mut Clock) -> Result<Payload, AvonError> {
    match data {
        InterfaceData::Ranger(mut scan) => {
            validate_ranger_scan(&scan)?;
            let time = clock.stamp_if_unset(&mut scan.time);
            to_json(time, &scan)
        }
        InterfaceData::Fiducial(mut scan) => {
            validate_fiducial_scan(&scan)?;
            let time = clock.stamp_if_unset(&mut scan.time);
            to_json(time, &scan)
        }
        InterfaceData::Message(message) => Ok(opaque(message, clock)),
    }
}

/// Decode a data payload of `kind`, validating caps.  This is the inverse
/// of [`encode_data`] and is what clients use to read responses.
pub fn decode_data(kind: InterfaceKind, body: &[u8]) -> Result<InterfaceData, AvonError> {
    require_usable(kind)?;
    match kind {
        InterfaceKind::Ranger => {
            let scan: RangerScan = from_json(body)?;
            validate_ranger_scan(&scan)?;
            Ok(InterfaceData::Ranger(scan))
        }
        InterfaceKind::Fiducial => {
            let scan: FiducialScan = from_json(body)?;
            validate_fiducial_scan(&scan)?;
            Ok(InterfaceData::Fiducial(scan))
        }
        _ => Ok(InterfaceData::Message(Message::new(kind, body.to_vec()))),
    }
}

/// Commands are opaque for every interface kind.
pub fn decode_command(kind: InterfaceKind, body: &[u8]) -> Result<Message, AvonError> {
    require_usable(kind)?;
    Ok(Message::new(kind, body.to_vec()))
}

pub fn encode_config(config: InterfaceConfig, clock: &mut Clock) -> Result<Payload, AvonError> {
    match config {
        InterfaceConfig::Ranger(mut cfg) => {
            validate_ranger_config(&cfg)?;
            let time = clock.stamp_if_unset(&mut cfg.time);
            to_json(time, &cfg)
        }
        InterfaceConfig::Fiducial(cfg) => {
            validate_fiducial_config(&cfg)?;
            to_json(clock.stamp(), &cfg)
        }
        InterfaceConfig::Message(message) => Ok(opaque(message, clock)),
    }
}

/// Decode a config payload for a model of `kind`, validating caps before
/// the backend sees it.
pub fn decode_config(kind: InterfaceKind, body: &[u8]) -> Result<InterfaceConfig, AvonError> {
    require_usable(kind)?;
    match kind {
        InterfaceKind::Ranger => {
            let cfg: RangerConfig = from_json(body)?;
            validate_ranger_config(&cfg)?;
            Ok(InterfaceConfig::Ranger(cfg))
        }
        InterfaceKind::Fiducial => {
            let cfg: FiducialConfig = from_json(body)?;
            validate_fiducial_config(&cfg)?;
            Ok(InterfaceConfig::Fiducial(cfg))
        }
        _ => Ok(InterfaceConfig::Message(Message::new(kind, body.to_vec()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avon_types::{Bounds, Fiducial, RangerSample, RangerTransducer, RangerTransducerConfig};

    fn fixed_clock(t: u64) -> Clock {
        Clock::new(Box::new(move || t))
    }

    fn transducer(samples: usize) -> RangerTransducer {
        RangerTransducer {
            pose: [0.1, 0.0, 0.2, 0.0, 0.0, 0.0],
            samples: (0..samples)
                .map(|i| RangerSample {
                    bearing: -1.0 + i as f64 * 0.01,
                    azimuth: 0.0,
                    range: 2.5 + i as f64,
                    intensity: if i % 2 == 0 { 1.0 } else { 0.0 },
                })
                .collect(),
        }
    }

    fn scan(counts: &[usize]) -> RangerScan {
        RangerScan {
            time: 0,
            pose: [0.0; 6],
            transducers: counts.iter().map(|&n| transducer(n)).collect(),
        }
    }

    #[test]
    fn ranger_scan_survives_encode_decode() {
        let mut clock = fixed_clock(77);
        let original = scan(&[3, 5]);
        let payload = encode_data(InterfaceData::Ranger(original.clone()), &mut clock).unwrap();
        assert_eq!(payload.time, 77);
        assert_eq!(payload.encoding, Encoding::Json);

        let InterfaceData::Ranger(decoded) = decode_data(InterfaceKind::Ranger, &payload.body)
            .unwrap()
        else {
            panic!("expected ranger data");
        };
        assert_eq!(decoded.time, 77);
        assert_eq!(decoded.transducers, original.transducers);
    }

    /// Encode, decode, then encode again with the same clock; the two
    /// bodies must be byte-identical.
    fn assert_reencodes(data: InterfaceData, kind: InterfaceKind) {
        let mut clock = fixed_clock(77);
        let first = encode_data(data, &mut clock).unwrap();
        let decoded = decode_data(kind, &first.body).unwrap();
        let second = encode_data(decoded, &mut clock).unwrap();
        assert_eq!(second.time, first.time);
        assert_eq!(second.body, first.body);
    }

    #[test]
    fn ranger_shapes_within_caps_reencode_identically() {
        let cases: [(&str, RangerScan); 5] = [
            ("no transducers", scan(&[])),
            ("empty transducer", scan(&[0])),
            ("mixed", scan(&[0, 1, 181])),
            ("one full transducer", scan(&[RANGER_SAMPLES_MAX])),
            ("full scan", scan(&[RANGER_SAMPLES_MAX; RANGER_TRANSDUCERS_MAX])),
        ];
        for (name, shape) in cases {
            let transducers = shape.transducers.len();
            let first = encode_data(InterfaceData::Ranger(shape), &mut fixed_clock(77))
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            let InterfaceData::Ranger(decoded) =
                decode_data(InterfaceKind::Ranger, &first.body).unwrap()
            else {
                panic!("{name}: expected ranger data");
            };
            assert_eq!(decoded.transducers.len(), transducers, "{name}");
            assert_reencodes(InterfaceData::Ranger(decoded), InterfaceKind::Ranger);
        }
    }

    #[test]
    fn fiducial_scan_at_cap_reencodes_identically() {
        let scan = FiducialScan {
            time: 0,
            fiducials: (0..FIDUCIALS_DETECTED_MAX as u64)
                .map(|id| Fiducial {
                    id,
                    pose: [1.0 + id as f64 * 0.125, 0.3, 0.0],
                    ..Fiducial::default()
                })
                .collect(),
        };
        assert_reencodes(InterfaceData::Fiducial(scan), InterfaceKind::Fiducial);
    }

    #[test]
    fn oversized_ranger_body_is_rejected_on_decode() {
        let body = serde_json::to_vec(&scan(&[RANGER_SAMPLES_MAX + 1])).unwrap();
        assert_eq!(
            decode_data(InterfaceKind::Ranger, &body),
            Err(AvonError::OutOfBounds {
                what: "sample".into(),
                count: RANGER_SAMPLES_MAX + 1,
                max: RANGER_SAMPLES_MAX
            })
        );

        let mut wide = scan(&[]);
        wide.transducers = vec![transducer(1); RANGER_TRANSDUCERS_MAX + 1];
        let body = serde_json::to_vec(&wide).unwrap();
        assert!(matches!(
            decode_data(InterfaceKind::Ranger, &body),
            Err(AvonError::OutOfBounds { what, .. }) if what == "transducer"
        ));
    }

    #[test]
    fn non_finite_values_are_refused_before_encoding() {
        let mut clock = fixed_clock(1);

        let mut endless = scan(&[3]);
        endless.transducers[0].samples[1].range = f64::INFINITY;
        assert!(matches!(
            encode_data(InterfaceData::Ranger(endless), &mut clock),
            Err(AvonError::Malformed(_))
        ));

        let unlimited = FiducialConfig {
            fov: [
                Bounds::new(f64::NEG_INFINITY, f64::INFINITY),
                Bounds::new(0.0, 0.0),
                Bounds::new(0.0, 8.0),
            ],
        };
        assert!(matches!(
            encode_config(InterfaceConfig::Fiducial(unlimited), &mut clock),
            Err(AvonError::Malformed(_))
        ));

        let ranger_cfg = RangerConfig {
            time: 0,
            transducers: vec![RangerTransducerConfig {
                fov: [Bounds::new(0.0, f64::INFINITY), Bounds::default(), Bounds::default()],
                ..RangerTransducerConfig::default()
            }],
        };
        assert!(matches!(
            encode_config(InterfaceConfig::Ranger(ranger_cfg), &mut clock),
            Err(AvonError::Malformed(_))
        ));

        let mut lost = FiducialScan {
            time: 0,
            fiducials: vec![Fiducial::default()],
        };
        lost.fiducials[0].pose[0] = f64::NAN;
        assert!(matches!(
            encode_data(InterfaceData::Fiducial(lost), &mut clock),
            Err(AvonError::Malformed(_))
        ));

        let mut pva = Pva::default();
        pva.v[0] = f64::NAN;
        assert!(matches!(encode_pva(pva, &mut clock), Err(AvonError::Malformed(_))));

        let mut geom = Geom::default();
        geom.extent[2] = f64::INFINITY;
        assert!(matches!(encode_geom(geom, &mut clock), Err(AvonError::Malformed(_))));
    }

    #[test]
    fn too_many_samples_is_rejected() {
        let mut clock = fixed_clock(1);
        let result = encode_data(InterfaceData::Ranger(scan(&[3, 2000])), &mut clock);
        assert_eq!(
            result,
            Err(AvonError::OutOfBounds {
                what: "sample".into(),
                count: 2000,
                max: RANGER_SAMPLES_MAX
            })
        );
    }

    #[test]
    fn too_many_transducers_is_rejected() {
        let mut clock = fixed_clock(1);
        let mut big = scan(&[]);
        big.transducers = vec![transducer(1); RANGER_TRANSDUCERS_MAX + 1];
        assert!(matches!(
            encode_data(InterfaceData::Ranger(big), &mut clock),
            Err(AvonError::OutOfBounds { count: 65, .. })
        ));
    }

    #[test]
    fn too_many_fiducials_is_rejected() {
        let mut clock = fixed_clock(1);
        let scan = FiducialScan {
            time: 0,
            fiducials: vec![Fiducial::default(); FIDUCIALS_DETECTED_MAX + 1],
        };
        assert!(matches!(
            encode_data(InterfaceData::Fiducial(scan), &mut clock),
            Err(AvonError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn oversized_ranger_config_is_rejected_on_decode() {
        let cfg = RangerConfig {
            time: 0,
            transducers: vec![RangerTransducerConfig::default(); RANGER_TRANSDUCERS_MAX + 1],
        };
        let body = serde_json::to_vec(&cfg).unwrap();
        assert!(matches!(
            decode_config(InterfaceKind::Ranger, &body),
            Err(AvonError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn capture_time_is_preserved() {
        let mut clock = fixed_clock(500);
        let pva = Pva {
            time: 123,
            ..Pva::default()
        };
        let payload = encode_pva(pva, &mut clock).unwrap();
        assert_eq!(payload.time, 123);
        assert_eq!(decode_pva(&payload.body).unwrap().time, 123);
    }

    #[test]
    fn fiducial_config_decodes() {
        let body = br#"{"fov":[{"min":-1.5,"max":1.5},{"min":0,"max":0},{"min":0,"max":8}]}"#;
        let InterfaceConfig::Fiducial(cfg) = decode_config(InterfaceKind::Fiducial, body).unwrap()
        else {
            panic!("expected fiducial config");
        };
        assert_eq!(cfg.fov[2], Bounds::new(0.0, 8.0));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            decode_geom(b"{not json"),
            Err(AvonError::Malformed(_))
        ));
    }

    #[test]
    fn opaque_messages_pass_through() {
        let mut clock = fixed_clock(9);
        let cmd = decode_command(InterfaceKind::Generic, b"\x01\x02").unwrap();
        assert_eq!(cmd.payload, vec![1, 2]);
        let payload = encode_data(InterfaceData::Message(cmd), &mut clock).unwrap();
        assert_eq!(payload.encoding, Encoding::Opaque);
        assert_eq!(payload.body, vec![1, 2]);
        assert_eq!(payload.time, 9);
    }

    #[test]
    fn reserved_kind_is_rejected() {
        assert!(matches!(
            decode_command(InterfaceKind::Position2d, b""),
            Err(AvonError::InvalidInterface(_))
        ));
    }
}
