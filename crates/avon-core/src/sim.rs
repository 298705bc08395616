//! In-process simulated backend for demos, CI and tests.
//!
//! [`SimWorld`] holds a flat planar world of robots and the sensors mounted
//! on them.  [`SimWorld::attach`] registers every body as a model on a
//! [`Server`] and installs capability handlers that read and write the
//! world, so the whole serving stack runs without a physical robot.
//!
//! # Stub behaviour
//!
//! | Model | Interface | Behaviour |
//! |---|---|---|
//! | `sim` root | `sim` | data: world time and pause state; commands `pause` / `resume` |
//! | robot | `generic` | PVA integrated by [`SimWorld::step`]; carries a fiducial id |
//! | ranger | `ranger` | rays cast against the bounding circles of other robots |
//! | fiducial finder | `fiducial` | reports other robots inside its field of view |
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use avon_core::sim::SimWorld;
//!
//! let world = SimWorld::builder()
//!     .robot("robot0", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
//!     .robot("robot1", [3.0, 0.0, 0.0, 0.0, 0.0, 0.0])
//!     .ranger("laser0", "robot0", 1, 181)
//!     .build()
//!     .unwrap();
//! let world = Rc::new(RefCell::new(world));
//! world.borrow_mut().step(0.1);
//! ```

use std::cell::RefCell;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::rc::Rc;

use avon_types::{
    AvonError, BackendError, Bounds, Fiducial, FiducialConfig, FiducialScan, Geom,
    InterfaceConfig, InterfaceData, InterfaceKind, Message, Pose6, Pva, RangerConfig,
    RangerSample, RangerScan, RangerTransducer, RangerTransducerConfig,
    geometry::axis,
};
use serde::Serialize;

use crate::capability::{InterfaceHandler, MotionState};
use crate::registry::Handle;
use crate::server::Server;

/// Handle of the `sim` root model.
pub const SIM_HANDLE: Handle = Handle(u64::MAX);
/// Name of the `sim` root model.
pub const SIM_MODEL: &str = "sim";

const ROBOT_EXTENT: [f64; 3] = [0.44, 0.38, 0.22];
const RANGER_MAX_RANGE: f64 = 8.0;
const FIDUCIAL_MAX_RANGE: f64 = 8.0;

// ─────────────────────────────────────────────────────────────────────────────
// World
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Sensor {
    None,
    Ranger {
        config: RangerConfig,
        samples: usize,
    },
    Fiducial(FiducialConfig),
}

#[derive(Debug, Clone)]
struct Body {
    name: String,
    prototype: String,
    kind: InterfaceKind,
    parent: Option<usize>,
    /// `p` is the pose on the parent (or in the world for top-level bodies).
    pva: Pva,
    geom: Geom,
    fiducial_id: Option<u64>,
    sensor: Sensor,
}

/// Planar pose `(x, y, z, yaw)` in the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WorldPose {
    x: f64,
    y: f64,
    z: f64,
    yaw: f64,
}

impl WorldPose {
    fn compose(&self, local: &Pose6) -> WorldPose {
        let (sin, cos) = self.yaw.sin_cos();
        WorldPose {
            x: self.x + local[axis::X] * cos - local[axis::Y] * sin,
            y: self.y + local[axis::X] * sin + local[axis::Y] * cos,
            z: self.z + local[axis::Z],
            yaw: self.yaw + local[axis::YAW],
        }
    }
}

fn normalize_angle(a: f64) -> f64 {
    let wrapped = (a + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// A simulated world.  Share it between handlers as `Rc<RefCell<SimWorld>>`.
#[derive(Debug, Clone)]
pub struct SimWorld {
    time: u64,
    paused: bool,
    bodies: Vec<Body>,
}

#[derive(Serialize)]
struct SimStatus {
    time: u64,
    paused: bool,
    bodies: usize,
}

impl SimWorld {
    pub fn builder() -> SimWorldBuilder {
        SimWorldBuilder::default()
    }

    /// Simulated time in microseconds.
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Advance the world by `dt` seconds, integrating every body's
    /// acceleration and velocity.  Velocities are in the body's frame.
    pub fn step(&mut self, dt: f64) {
        if self.paused || dt <= 0.0 {
            return;
        }
        self.time += (dt * 1e6).round() as u64;
        for body in &mut self.bodies {
            let pva = &mut body.pva;
            for i in 0..6 {
                pva.v[i] += pva.a[i] * dt;
            }
            let (sin, cos) = pva.p[axis::YAW].sin_cos();
            pva.p[axis::X] += (pva.v[axis::X] * cos - pva.v[axis::Y] * sin) * dt;
            pva.p[axis::Y] += (pva.v[axis::X] * sin + pva.v[axis::Y] * cos) * dt;
            pva.p[axis::Z] += pva.v[axis::Z] * dt;
            for i in axis::ROLL..=axis::YAW {
                pva.p[i] += pva.v[i] * dt;
            }
            pva.p[axis::YAW] = normalize_angle(pva.p[axis::YAW]);
        }
    }

    /// Register every body as a model on `server` and install the
    /// simulator's clock and capability handlers.
    pub fn attach(world: &Rc<RefCell<SimWorld>>, server: &mut Server) -> Result<(), AvonError> {
        server.register_model(SIM_MODEL, "avon-sim", InterfaceKind::Sim, None, SIM_HANDLE)?;
        {
            let w = world.borrow();
            for (index, body) in w.bodies.iter().enumerate() {
                let parent = body.parent.map(|p| w.bodies[p].name.as_str());
                server.register_model(&body.name, &body.prototype, body.kind, parent, index)?;
            }
        }

        let clock = Rc::clone(world);
        server.install_clock(move || clock.borrow().time())?;
        server.install_motion_state(SimMotion(Rc::clone(world)))?;
        server.install_interface(InterfaceKind::Sim, SimControl(Rc::clone(world)))?;
        server.install_interface(InterfaceKind::Ranger, SimRanger(Rc::clone(world)))?;
        server.install_interface(InterfaceKind::Fiducial, SimFiducial(Rc::clone(world)))?;
        Ok(())
    }

    fn body(&self, handle: Handle) -> Result<&Body, BackendError> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|i| self.bodies.get(i))
            .ok_or_else(|| BackendError::Failed(format!("no simulated body {}", handle.0)))
    }

    fn body_mut(&mut self, handle: Handle) -> Result<&mut Body, BackendError> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|i| self.bodies.get_mut(i))
            .ok_or_else(|| BackendError::Failed(format!("no simulated body {}", handle.0)))
    }

    fn world_pose(&self, index: usize) -> WorldPose {
        let body = &self.bodies[index];
        let base = match body.parent {
            Some(p) => self.world_pose(p),
            None => WorldPose {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                yaw: 0.0,
            },
        };
        base.compose(&body.pva.p)
    }

    fn root_of(&self, mut index: usize) -> usize {
        while let Some(p) = self.bodies[index].parent {
            index = p;
        }
        index
    }

    /// Top-level bodies other than the one carrying `sensor`.
    fn others(&self, sensor: usize) -> impl Iterator<Item = (usize, &Body)> {
        let own_root = self.root_of(sensor);
        self.bodies
            .iter()
            .enumerate()
            .filter(move |(i, b)| b.parent.is_none() && *i != own_root)
    }

    /// Distance along a ray to the nearest bounding circle, if any.
    fn cast(&self, sensor: usize, origin: &WorldPose, heading: f64) -> Option<f64> {
        let (uy, ux) = heading.sin_cos();
        self.others(sensor)
            .filter_map(|(i, b)| {
                let radius = 0.5 * b.geom.extent[0].max(b.geom.extent[1]);
                let centre = self.world_pose(i);
                let (dx, dy) = (centre.x - origin.x, centre.y - origin.y);
                let along = dx * ux + dy * uy;
                let perp_sq = dx * dx + dy * dy - along * along;
                if along <= 0.0 || perp_sq > radius * radius {
                    return None;
                }
                Some(along - (radius * radius - perp_sq).sqrt())
            })
            .filter(|d| *d >= 0.0)
            .min_by(f64::total_cmp)
    }

    fn ranger_scan(&self, index: usize) -> Result<RangerScan, BackendError> {
        let body = &self.bodies[index];
        let Sensor::Ranger { config, samples } = &body.sensor else {
            return Err(BackendError::Failed(format!("{} is not a ranger", body.name)));
        };
        let count = *samples;
        let mount = self.world_pose(index);
        let transducers = config
            .transducers
            .iter()
            .map(|t| {
                let origin = mount.compose(&t.geom.pose);
                let [bearing, _, range] = t.fov;
                let step = if count > 1 {
                    (bearing.max - bearing.min) / (count - 1) as f64
                } else {
                    0.0
                };
                let samples = (0..count)
                    .map(|i| {
                        let b = if count > 1 {
                            bearing.min + step * i as f64
                        } else {
                            0.5 * (bearing.min + bearing.max)
                        };
                        match self.cast(index, &origin, origin.yaw + b) {
                            Some(d) if range.contains(d) => RangerSample {
                                bearing: b,
                                azimuth: 0.0,
                                range: d,
                                intensity: 1.0,
                            },
                            _ => RangerSample {
                                bearing: b,
                                azimuth: 0.0,
                                range: range.max,
                                intensity: 0.0,
                            },
                        }
                    })
                    .collect();
                RangerTransducer {
                    pose: t.geom.pose,
                    samples,
                }
            })
            .collect();
        Ok(RangerScan {
            time: self.time,
            pose: body.pva.p,
            transducers,
        })
    }

    fn fiducial_scan(&self, index: usize) -> Result<FiducialScan, BackendError> {
        let body = &self.bodies[index];
        let Sensor::Fiducial(config) = &body.sensor else {
            return Err(BackendError::Failed(format!("{} is not a fiducial finder", body.name)));
        };
        let here = self.world_pose(index);
        let fiducials = self
            .others(index)
            .filter_map(|(i, target)| {
                let id = target.fiducial_id?;
                let there = self.world_pose(i);
                let (dx, dy, dz) = (there.x - here.x, there.y - here.y, there.z - here.z);
                let range = dx.hypot(dy);
                let bearing = normalize_angle(dy.atan2(dx) - here.yaw);
                let azimuth = dz.atan2(range);
                let [fov_bearing, _, fov_range] = config.fov;
                if !fov_bearing.contains(bearing) || !fov_range.contains(range) {
                    return None;
                }
                let mut pose = [0.0; 6];
                pose[axis::YAW] = normalize_angle(there.yaw - here.yaw);
                Some(Fiducial {
                    id,
                    pose: [bearing, azimuth, range],
                    geom: Geom {
                        time: 0,
                        pose,
                        extent: target.geom.extent,
                    },
                })
            })
            .collect();
        Ok(FiducialScan {
            time: self.time,
            fiducials,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

struct PendingBody {
    body: Body,
    parent: Option<String>,
}

/// Builder for a [`SimWorld`].  Parents must be added before children.
#[derive(Default)]
pub struct SimWorldBuilder {
    pending: Vec<PendingBody>,
    next_fiducial: u64,
}

impl SimWorldBuilder {
    fn push(&mut self, body: Body, parent: Option<&str>) {
        self.pending.push(PendingBody {
            body,
            parent: parent.map(str::to_string),
        });
    }

    /// Add a top-level robot at `pose`.  Each robot carries a unique
    /// fiducial id, starting at 1.
    pub fn robot(mut self, name: impl Into<String>, pose: Pose6) -> Self {
        self.next_fiducial += 1;
        let body = Body {
            name: name.into(),
            prototype: "pioneer2dx".to_string(),
            kind: InterfaceKind::Generic,
            parent: None,
            pva: Pva {
                p: pose,
                ..Pva::default()
            },
            geom: Geom {
                time: 0,
                pose: [0.0; 6],
                extent: ROBOT_EXTENT,
            },
            fiducial_id: Some(self.next_fiducial),
            sensor: Sensor::None,
        };
        self.push(body, None);
        self
    }

    /// Add a ranger mounted on `parent`.  A single transducer sweeps the
    /// front half-plane; several transducers are spread evenly around the
    /// body, sonar-style.
    pub fn ranger(
        mut self,
        name: impl Into<String>,
        parent: &str,
        transducers: usize,
        samples: usize,
    ) -> Self {
        let config = RangerConfig {
            time: 0,
            transducers: (0..transducers)
                .map(|i| {
                    let (yaw, half_fov) = if transducers == 1 {
                        (0.0, FRAC_PI_2)
                    } else {
                        (TAU * i as f64 / transducers as f64, 0.13)
                    };
                    let mut pose = [0.0; 6];
                    pose[axis::YAW] = normalize_angle(yaw);
                    RangerTransducerConfig {
                        geom: Geom {
                            time: 0,
                            pose,
                            extent: [0.05, 0.05, 0.05],
                        },
                        fov: [
                            Bounds::new(-half_fov, half_fov),
                            Bounds::new(0.0, 0.0),
                            Bounds::new(0.0, RANGER_MAX_RANGE),
                        ],
                    }
                })
                .collect(),
        };
        let body = Body {
            name: name.into(),
            prototype: "sicklms200".to_string(),
            kind: InterfaceKind::Ranger,
            parent: None,
            pva: Pva::default(),
            geom: Geom {
                time: 0,
                pose: [0.0; 6],
                extent: [0.15, 0.15, 0.2],
            },
            fiducial_id: None,
            sensor: Sensor::Ranger { config, samples },
        };
        self.push(body, Some(parent));
        self
    }

    /// Add a fiducial finder with a forward half-plane field of view.
    pub fn fiducial_finder(mut self, name: impl Into<String>, parent: &str) -> Self {
        let body = Body {
            name: name.into(),
            prototype: "fiducialfinder".to_string(),
            kind: InterfaceKind::Fiducial,
            parent: None,
            pva: Pva::default(),
            geom: Geom::default(),
            fiducial_id: None,
            sensor: Sensor::Fiducial(FiducialConfig {
                fov: [
                    Bounds::new(-FRAC_PI_2, FRAC_PI_2),
                    Bounds::new(-FRAC_PI_2, FRAC_PI_2),
                    Bounds::new(0.0, FIDUCIAL_MAX_RANGE),
                ],
            }),
        };
        self.push(body, Some(parent));
        self
    }

    /// Resolve parents and build the world.
    ///
    /// # Errors
    ///
    /// [`AvonError::UnknownParent`] when a sensor names a parent that was
    /// not added before it.
    pub fn build(self) -> Result<SimWorld, AvonError> {
        let mut bodies: Vec<Body> = Vec::with_capacity(self.pending.len());
        for PendingBody { mut body, parent } in self.pending {
            if let Some(parent) = parent {
                let index = bodies.iter().position(|b| b.name == parent).ok_or_else(|| {
                    AvonError::UnknownParent {
                        name: body.name.clone(),
                        parent: parent.clone(),
                    }
                })?;
                body.parent = Some(index);
            }
            bodies.push(body);
        }
        Ok(SimWorld {
            time: 0,
            paused: false,
            bodies,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability handlers
// ─────────────────────────────────────────────────────────────────────────────

struct SimMotion(Rc<RefCell<SimWorld>>);

impl MotionState for SimMotion {
    fn get_pva(&mut self, handle: Handle) -> Result<Pva, BackendError> {
        let world = self.0.borrow();
        let mut pva = world.body(handle)?.pva;
        pva.time = world.time;
        Ok(pva)
    }

    fn set_pva(&mut self, handle: Handle, pva: &Pva) -> Result<(), BackendError> {
        self.0.borrow_mut().body_mut(handle)?.pva = *pva;
        Ok(())
    }

    fn get_geom(&mut self, handle: Handle) -> Result<Geom, BackendError> {
        let world = self.0.borrow();
        let mut geom = world.body(handle)?.geom;
        geom.time = world.time;
        Ok(geom)
    }

    fn set_geom(&mut self, handle: Handle, geom: &Geom) -> Result<(), BackendError> {
        if geom.extent.iter().any(|e| *e < 0.0) {
            return Err(BackendError::Failed("extent must not be negative".into()));
        }
        self.0.borrow_mut().body_mut(handle)?.geom = *geom;
        Ok(())
    }
}

struct SimControl(Rc<RefCell<SimWorld>>);

impl InterfaceHandler for SimControl {
    fn get_data(&mut self, _handle: Handle) -> Result<InterfaceData, BackendError> {
        let world = self.0.borrow();
        let status = SimStatus {
            time: world.time,
            paused: world.paused,
            bodies: world.bodies.len(),
        };
        let payload =
            serde_json::to_vec(&status).map_err(|e| BackendError::Failed(e.to_string()))?;
        Ok(InterfaceData::Message(Message {
            time: world.time,
            interface: InterfaceKind::Sim,
            payload,
        }))
    }

    fn set_command(&mut self, _handle: Handle, command: &Message) -> Result<(), BackendError> {
        let mut world = self.0.borrow_mut();
        match String::from_utf8_lossy(&command.payload).trim() {
            "pause" => world.paused = true,
            "resume" | "run" => world.paused = false,
            other => return Err(BackendError::Failed(format!("unknown sim command '{other}'"))),
        }
        Ok(())
    }
}

struct SimRanger(Rc<RefCell<SimWorld>>);

impl InterfaceHandler for SimRanger {
    fn get_data(&mut self, handle: Handle) -> Result<InterfaceData, BackendError> {
        let world = self.0.borrow();
        world.body(handle)?;
        Ok(InterfaceData::Ranger(world.ranger_scan(handle.0 as usize)?))
    }

    fn get_config(&mut self, handle: Handle) -> Result<InterfaceConfig, BackendError> {
        let world = self.0.borrow();
        match &world.body(handle)?.sensor {
            Sensor::Ranger { config, .. } => Ok(InterfaceConfig::Ranger(RangerConfig {
                time: world.time,
                ..config.clone()
            })),
            _ => Err(BackendError::Failed("not a ranger".into())),
        }
    }

    fn set_config(&mut self, handle: Handle, config: &InterfaceConfig) -> Result<(), BackendError> {
        let InterfaceConfig::Ranger(new_config) = config else {
            return Err(BackendError::Failed("expected a ranger config".into()));
        };
        let mut world = self.0.borrow_mut();
        match &mut world.body_mut(handle)?.sensor {
            Sensor::Ranger { config, .. } => {
                *config = new_config.clone();
                Ok(())
            }
            _ => Err(BackendError::Failed("not a ranger".into())),
        }
    }
}

struct SimFiducial(Rc<RefCell<SimWorld>>);

impl InterfaceHandler for SimFiducial {
    fn get_data(&mut self, handle: Handle) -> Result<InterfaceData, BackendError> {
        let world = self.0.borrow();
        world.body(handle)?;
        Ok(InterfaceData::Fiducial(world.fiducial_scan(handle.0 as usize)?))
    }

    fn get_config(&mut self, handle: Handle) -> Result<InterfaceConfig, BackendError> {
        match &self.0.borrow().body(handle)?.sensor {
            Sensor::Fiducial(config) => Ok(InterfaceConfig::Fiducial(*config)),
            _ => Err(BackendError::Failed("not a fiducial finder".into())),
        }
    }

    fn set_config(&mut self, handle: Handle, config: &InterfaceConfig) -> Result<(), BackendError> {
        let InterfaceConfig::Fiducial(new_config) = config else {
            return Err(BackendError::Failed("expected a fiducial config".into()));
        };
        match &mut self.0.borrow_mut().body_mut(handle)?.sensor {
            Sensor::Fiducial(config) => {
                *config = *new_config;
                Ok(())
            }
            _ => Err(BackendError::Failed("not a fiducial finder".into())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
