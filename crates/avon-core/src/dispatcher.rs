//! [`Dispatcher`] – routes addressed requests to backend capabilities.
//!
//! Resolution order for every request:
//!
//! 1. Look the model up by name ([`AvonError::UnknownModel`]).
//! 2. Motion operations go to the single [`MotionState`] handler.
//! 3. Interface operations first check that the addressed interface kind
//!    matches the model's registered kind ([`AvonError::InterfaceMismatch`]),
//!    then go to the handler bound for that kind.
//! 4. Payloads are encoded or decoded through the [`codec`].
//!
//! Every failure is scoped to the request; the dispatcher itself is never
//! left in a bad state.
//!
//! [`MotionState`]: crate::capability::MotionState

use avon_types::{AvonError, BackendError, InterfaceConfig, InterfaceData, InterfaceKind, Operation};
use tracing::instrument;

use crate::capability::CapabilityTable;
use crate::codec::{self, Payload};
use crate::registry::ModelRegistry;

/// An addressed request: `(model, interface, operation)` plus an optional
/// body for the set operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub model: String,
    /// Interface the client addressed.  Ignored by motion operations, which
    /// every model supports.
    pub interface: InterfaceKind,
    pub operation: Operation,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(model: impl Into<String>, interface: InterfaceKind, operation: Operation) -> Self {
        Self {
            model: model.into(),
            interface,
            operation,
            body: Vec::new(),
        }
    }

    /// A motion request (`getPva`, `setPva`, `getGeom`, `setGeom`).
    pub fn motion(model: impl Into<String>, operation: Operation) -> Self {
        Self::new(model, InterfaceKind::Generic, operation)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Owns the model registry and the capability table and executes requests
/// against them.
#[derive(Default)]
pub struct Dispatcher {
    registry: ModelRegistry,
    capabilities: CapabilityTable,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    pub fn capabilities_mut(&mut self) -> &mut CapabilityTable {
        &mut self.capabilities
    }

    /// Execute `request` and return the encoded response body.
    ///
    /// # Errors
    ///
    /// Any serving-phase [`AvonError`]; see the module documentation.
    #[instrument(
        level = "debug",
        skip(self, request),
        fields(model = %request.model, operation = %request.operation)
    )]
    pub fn dispatch(&mut self, request: &Request) -> Result<Payload, AvonError> {
        let Self {
            registry,
            capabilities,
        } = self;
        let model = registry.resolve(&request.model)?;
        let handle = model.handle;
        let op = request.operation;

        let backend = |e: BackendError, interface: InterfaceKind| match e {
            BackendError::Unsupported => AvonError::CapabilityNotInstalled {
                interface,
                operation: op,
            },
            BackendError::Failed(details) => AvonError::BackendFailure {
                model: model.name.clone(),
                operation: op,
                details,
            },
        };

        if op.is_motion() {
            let generic = InterfaceKind::Generic;
            let not_installed = AvonError::CapabilityNotInstalled {
                interface: generic,
                operation: op,
            };
            let motion = capabilities.motion_mut().ok_or(not_installed)?;
            return match op {
                Operation::GetPva => {
                    let pva = motion.get_pva(handle).map_err(|e| backend(e, generic))?;
                    codec::encode_pva(pva, capabilities.clock_mut())
                }
                Operation::SetPva => {
                    let pva = codec::decode_pva(&request.body)?;
                    motion
                        .set_pva(handle, &pva)
                        .map_err(|e| backend(e, generic))?;
                    Ok(Payload::empty())
                }
                Operation::GetGeom => {
                    let geom = motion.get_geom(handle).map_err(|e| backend(e, generic))?;
                    codec::encode_geom(geom, capabilities.clock_mut())
                }
                _ => {
                    let geom = codec::decode_geom(&request.body)?;
                    motion
                        .set_geom(handle, &geom)
                        .map_err(|e| backend(e, generic))?;
                    Ok(Payload::empty())
                }
            };
        }

        let kind = model.interface;
        if request.interface != kind {
            return Err(AvonError::InterfaceMismatch {
                model: model.name.clone(),
                registered: kind,
                requested: request.interface,
            });
        }
        let handler = capabilities
            .interface_mut(kind)
            .ok_or(AvonError::CapabilityNotInstalled {
                interface: kind,
                operation: op,
            })?;
        let wrong_kind = |got: InterfaceKind| AvonError::BackendFailure {
            model: model.name.clone(),
            operation: op,
            details: format!("handler returned {got} payload for a {kind} model"),
        };

        match op {
            Operation::GetData => {
                let data: InterfaceData = handler.get_data(handle).map_err(|e| backend(e, kind))?;
                if data.kind() != kind {
                    return Err(wrong_kind(data.kind()));
                }
                codec::encode_data(data, capabilities.clock_mut())
            }
            Operation::SetCommand => {
                let command = codec::decode_command(kind, &request.body)?;
                handler
                    .set_command(handle, &command)
                    .map_err(|e| backend(e, kind))?;
                Ok(Payload::empty())
            }
            Operation::GetConfig => {
                let config: InterfaceConfig =
                    handler.get_config(handle).map_err(|e| backend(e, kind))?;
                if config.kind() != kind {
                    return Err(wrong_kind(config.kind()));
                }
                codec::encode_config(config, capabilities.clock_mut())
            }
            _ => {
                let config = codec::decode_config(kind, &request.body)?;
                handler
                    .set_config(handle, &config)
                    .map_err(|e| backend(e, kind))?;
                Ok(Payload::empty())
            }
        }
    }

    /// Drop all models and capability bindings.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.capabilities.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use avon_types::{
        FiducialConfig, Message, Pva, RANGER_SAMPLES_MAX, RangerSample, RangerScan,
        RangerTransducer,
    };

    use super::*;
    use crate::capability::{InterfaceHandler, MotionState};
    use crate::codec::Encoding;
    use crate::registry::Handle;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    /// Ranger handler whose sample counts are configurable per call.
    struct MockRanger {
        counts: Rc<RefCell<Vec<usize>>>,
        calls: Rc<Cell<usize>>,
    }

    impl InterfaceHandler for MockRanger {
        fn get_data(&mut self, _handle: Handle) -> Result<InterfaceData, BackendError> {
            self.calls.set(self.calls.get() + 1);
            let transducers = self
                .counts
                .borrow()
                .iter()
                .map(|&n| RangerTransducer {
                    pose: [0.0; 6],
                    samples: (0..n)
                        .map(|i| RangerSample {
                            bearing: i as f64 * 0.1,
                            azimuth: 0.0,
                            range: 1.0 + i as f64,
                            intensity: 1.0,
                        })
                        .collect(),
                })
                .collect();
            Ok(InterfaceData::Ranger(RangerScan {
                time: 0,
                pose: [0.0; 6],
                transducers,
            }))
        }
    }

    #[derive(Default)]
    struct MockMotion {
        pva: Pva,
        fail: bool,
    }

    impl MotionState for MockMotion {
        fn get_pva(&mut self, _handle: Handle) -> Result<Pva, BackendError> {
            if self.fail {
                return Err(BackendError::Failed("encoder offline".into()));
            }
            Ok(self.pva)
        }

        fn set_pva(&mut self, _handle: Handle, pva: &Pva) -> Result<(), BackendError> {
            self.pva = *pva;
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        counts: Rc<RefCell<Vec<usize>>>,
        ranger_calls: Rc<Cell<usize>>,
    }

    fn fixture() -> Fixture {
        let mut dispatcher = Dispatcher::new();
        let registry = dispatcher.registry_mut();
        registry
            .register("robot0", "pioneer2dx", InterfaceKind::Generic, None, Handle(0))
            .unwrap();
        registry
            .register("laser0", "sicklms200", InterfaceKind::Ranger, Some("robot0"), Handle(1))
            .unwrap();
        registry
            .register("fid0", "fiducialfinder", InterfaceKind::Fiducial, Some("robot0"), Handle(2))
            .unwrap();

        let counts = Rc::new(RefCell::new(vec![3, 5]));
        let ranger_calls = Rc::new(Cell::new(0));
        let caps = dispatcher.capabilities_mut();
        let mut tick = 0u64;
        caps.bind_clock(Box::new(move || {
            tick += 1;
            tick
        }));
        caps.bind_motion_state(Box::new(MockMotion::default()));
        caps.bind_interface(
            InterfaceKind::Ranger,
            Box::new(MockRanger {
                counts: Rc::clone(&counts),
                calls: Rc::clone(&ranger_calls),
            }),
        )
        .unwrap();

        Fixture {
            dispatcher,
            counts,
            ranger_calls,
        }
    }

    fn ranger_data(fx: &mut Fixture) -> Result<Payload, AvonError> {
        fx.dispatcher.dispatch(&Request::new(
            "laser0",
            InterfaceKind::Ranger,
            Operation::GetData,
        ))
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn ranger_data_keeps_transducer_layout() {
        let mut fx = fixture();
        let payload = ranger_data(&mut fx).unwrap();
        let scan: RangerScan = serde_json::from_slice(&payload.body).unwrap();
        assert_eq!(scan.transducers.len(), 2);
        assert_eq!(scan.transducers[0].samples.len(), 3);
        assert_eq!(scan.transducers[1].samples.len(), 5);
        assert!((scan.transducers[1].samples[4].range - 5.0).abs() < f64::EPSILON);
        assert!((scan.transducers[1].samples[2].bearing - 0.2).abs() < 1e-12);
    }

    #[test]
    fn oversized_scan_fails_and_next_request_succeeds() {
        let mut fx = fixture();
        *fx.counts.borrow_mut() = vec![3, 2000];
        assert!(matches!(
            ranger_data(&mut fx),
            Err(AvonError::OutOfBounds {
                count: 2000,
                max: RANGER_SAMPLES_MAX,
                ..
            })
        ));

        let pva = fx
            .dispatcher
            .dispatch(&Request::motion("robot0", Operation::GetPva))
            .unwrap();
        assert_eq!(pva.encoding, Encoding::Json);

        *fx.counts.borrow_mut() = vec![1];
        assert!(ranger_data(&mut fx).is_ok());
    }

    #[test]
    fn interface_mismatch_never_calls_handler() {
        let mut fx = fixture();
        let result = fx.dispatcher.dispatch(&Request::new(
            "fid0",
            InterfaceKind::Ranger,
            Operation::GetData,
        ));
        assert!(matches!(
            result,
            Err(AvonError::InterfaceMismatch {
                registered: InterfaceKind::Fiducial,
                requested: InterfaceKind::Ranger,
                ..
            })
        ));
        assert_eq!(fx.ranger_calls.get(), 0);
    }

    #[test]
    fn unbound_fiducial_config_is_not_installed() {
        let mut fx = fixture();
        let result = fx.dispatcher.dispatch(&Request::new(
            "fid0",
            InterfaceKind::Fiducial,
            Operation::GetConfig,
        ));
        assert_eq!(
            result,
            Err(AvonError::CapabilityNotInstalled {
                interface: InterfaceKind::Fiducial,
                operation: Operation::GetConfig,
            })
        );
    }

    #[test]
    fn unsupported_slot_is_not_installed() {
        let mut fx = fixture();
        let result = fx.dispatcher.dispatch(
            &Request::new("laser0", InterfaceKind::Ranger, Operation::SetCommand)
                .with_body(b"go".to_vec()),
        );
        assert!(matches!(
            result,
            Err(AvonError::CapabilityNotInstalled {
                operation: Operation::SetCommand,
                ..
            })
        ));
    }

    #[test]
    fn unknown_model() {
        let mut fx = fixture();
        let result = fx
            .dispatcher
            .dispatch(&Request::motion("ghost", Operation::GetPva));
        assert_eq!(result, Err(AvonError::UnknownModel("ghost".into())));
    }

    #[test]
    fn motion_without_handler_is_not_installed() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .registry_mut()
            .register("robot0", "x", InterfaceKind::Generic, None, Handle(0))
            .unwrap();
        let result = dispatcher.dispatch(&Request::motion("robot0", Operation::GetGeom));
        assert!(matches!(
            result,
            Err(AvonError::CapabilityNotInstalled {
                interface: InterfaceKind::Generic,
                ..
            })
        ));
    }

    #[test]
    fn set_then_get_pva() {
        let mut fx = fixture();
        let pva = Pva {
            time: 0,
            p: [1.0, 2.0, 0.0, 0.0, 0.0, 0.3],
            v: [0.5, 0.0, 0.0, 0.0, 0.0, 0.0],
            a: [0.0; 6],
        };
        let set = Request::motion("robot0", Operation::SetPva)
            .with_body(serde_json::to_vec(&pva).unwrap());
        assert_eq!(
            fx.dispatcher.dispatch(&set).unwrap().encoding,
            Encoding::Empty
        );

        let got = fx
            .dispatcher
            .dispatch(&Request::motion("robot0", Operation::GetPva))
            .unwrap();
        let back: Pva = serde_json::from_slice(&got.body).unwrap();
        assert_eq!(back.p, pva.p);
        assert_eq!(back.v, pva.v);
        assert!(back.time > 0);
    }

    #[test]
    fn motion_request_ignores_addressed_interface() {
        let mut fx = fixture();
        let result = fx.dispatcher.dispatch(&Request::new(
            "laser0",
            InterfaceKind::Fiducial,
            Operation::GetPva,
        ));
        assert!(result.is_ok());
    }

    #[test]
    fn backend_failure_carries_context() {
        let mut fx = fixture();
        fx.dispatcher
            .capabilities_mut()
            .bind_motion_state(Box::new(MockMotion {
                fail: true,
                ..MockMotion::default()
            }));
        let result = fx
            .dispatcher
            .dispatch(&Request::motion("robot0", Operation::GetPva));
        assert_eq!(
            result,
            Err(AvonError::BackendFailure {
                model: "robot0".into(),
                operation: Operation::GetPva,
                details: "encoder offline".into(),
            })
        );
    }

    #[test]
    fn wrong_payload_kind_is_backend_failure() {
        struct Confused;
        impl InterfaceHandler for Confused {
            fn get_config(&mut self, _: Handle) -> Result<InterfaceConfig, BackendError> {
                Ok(InterfaceConfig::Message(Message::new(InterfaceKind::Sim, vec![])))
            }
        }

        let mut fx = fixture();
        fx.dispatcher
            .capabilities_mut()
            .bind_interface(InterfaceKind::Fiducial, Box::new(Confused))
            .unwrap();
        let result = fx.dispatcher.dispatch(&Request::new(
            "fid0",
            InterfaceKind::Fiducial,
            Operation::GetConfig,
        ));
        assert!(matches!(result, Err(AvonError::BackendFailure { .. })));
    }

    #[test]
    fn malformed_config_is_rejected_before_backend() {
        struct Recording(Rc<Cell<bool>>);
        impl InterfaceHandler for Recording {
            fn set_config(&mut self, _: Handle, _: &InterfaceConfig) -> Result<(), BackendError> {
                self.0.set(true);
                Ok(())
            }
        }

        let called = Rc::new(Cell::new(false));
        let mut fx = fixture();
        fx.dispatcher
            .capabilities_mut()
            .bind_interface(InterfaceKind::Fiducial, Box::new(Recording(Rc::clone(&called))))
            .unwrap();

        let bad = Request::new("fid0", InterfaceKind::Fiducial, Operation::SetConfig)
            .with_body(b"{\"fov\": 3}".to_vec());
        assert!(matches!(
            fx.dispatcher.dispatch(&bad),
            Err(AvonError::Malformed(_))
        ));
        assert!(!called.get());

        let good = Request::new("fid0", InterfaceKind::Fiducial, Operation::SetConfig)
            .with_body(serde_json::to_vec(&FiducialConfig::default()).unwrap());
        assert!(fx.dispatcher.dispatch(&good).is_ok());
        assert!(called.get());
    }

    #[test]
    fn successive_stamps_are_non_decreasing() {
        let mut fx = fixture();
        let mut last = 0;
        for _ in 0..5 {
            let pva = fx
                .dispatcher
                .dispatch(&Request::motion("robot0", Operation::GetPva))
                .unwrap();
            assert!(pva.time >= last);
            last = pva.time;
        }
    }
}
