use std::{cell::Cell, f32::consts::TAU, rc::Rc, time::Duration};

use serde::Deserialize;

use super::{Subsystem, View};
use crate::{
    assets::Mesh,
    raster::{Image, Rgb},
    HyperviewError, Result,
};

/// Rotation of 4D space in the three planes containing W, followed by a
/// perspective divide along W.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub xw: f32,
    pub yw: f32,
    pub zw: f32,
    /// Distance of the 4D eye along W.
    pub eye_w: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            xw: 0.0,
            yw: 0.0,
            zw: 0.0,
            eye_w: 2.5,
        }
    }
}

impl Projection {
    pub fn project(&self, [x, y, z, w]: [f32; 4]) -> [f32; 3] {
        let (x, w) = rotate(x, w, self.xw);
        let (y, w) = rotate(y, w, self.yw);
        let (z, w) = rotate(z, w, self.zw);
        let scale = 1.0 / (self.eye_w - w).max(0.1);
        [x * scale, y * scale, z * scale]
    }
}

fn rotate(a: f32, b: f32, angle: f32) -> (f32, f32) {
    let (s, c) = angle.sin_cos();
    (a * c - b * s, a * s + b * c)
}

/// Read-only view of the projector's current state.
#[derive(Debug, Clone)]
pub struct ProjectionHandle(Rc<Cell<Projection>>);

impl ProjectionHandle {
    pub fn get(&self) -> Projection {
        self.0.get()
    }
}

/// Owns the 4D rotation shared by every 4D layer.
#[derive(Debug)]
pub struct Projector4D {
    state: Rc<Cell<Projection>>,
    /// Angular speeds (rad/s) in the XW, YW and ZW planes.
    speeds: [f32; 3],
}

impl Projector4D {
    pub fn new(speeds: [f32; 3]) -> Self {
        Self {
            state: Rc::new(Cell::new(Projection::default())),
            speeds,
        }
    }

    pub fn handle(&self) -> ProjectionHandle {
        ProjectionHandle(Rc::clone(&self.state))
    }
}

impl Default for Projector4D {
    fn default() -> Self {
        Self::new([0.21, 0.13, 0.08])
    }
}

impl Subsystem for Projector4D {
    fn name(&self) -> &str {
        "projector4d"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        let dt = elapsed.as_secs_f32();
        let mut projection = self.state.get();
        projection.xw = (projection.xw + self.speeds[0] * dt) % TAU;
        projection.yw = (projection.yw + self.speeds[1] * dt) % TAU;
        projection.zw = (projection.zw + self.speeds[2] * dt) % TAU;
        self.state.set(projection);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GraphDocument {
    vertices: Vec<[f32; 4]>,
    edges: Vec<[usize; 2]>,
}

/// Wireframe polytope, spinning in the XY plane before 4D projection.
#[derive(Debug)]
pub struct PolytopeManager {
    projection: ProjectionHandle,
    vertices: Vec<[f32; 4]>,
    edges: Vec<[usize; 2]>,
    spin: f32,
    speed: f32,
}

impl PolytopeManager {
    /// The 16-vertex tesseract.
    pub fn tesseract(projection: ProjectionHandle) -> Self {
        let vertices: Vec<[f32; 4]> = (0..16_u32)
            .map(|i| std::array::from_fn(|axis| if (i >> axis) & 1 == 1 { 0.5 } else { -0.5 }))
            .collect();
        let mut edges = Vec::new();
        for a in 0..16_usize {
            for axis in 0..4 {
                let b = a ^ (1 << axis);
                if a < b {
                    edges.push([a, b]);
                }
            }
        }
        Self {
            projection,
            vertices,
            edges,
            spin: 0.0,
            speed: 0.35,
        }
    }

    /// Builds the polytope from a `{ "vertices": [...], "edges": [...] }` data
    /// asset. Documents without that shape fall back to the tesseract.
    pub fn from_graph(graph: &serde_json::Value, projection: ProjectionHandle) -> Result<Self> {
        let Ok(document) = GraphDocument::deserialize(graph) else {
            return Ok(Self::tesseract(projection));
        };
        if let Some(edge) = document
            .edges
            .iter()
            .find(|edge| edge.iter().any(|&i| i >= document.vertices.len()))
        {
            return Err(HyperviewError::msg(format!(
                "graph edge {edge:?} references a missing vertex"
            )));
        }
        Ok(Self {
            vertices: document.vertices,
            edges: document.edges,
            ..Self::tesseract(projection)
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl Subsystem for PolytopeManager {
    fn name(&self) -> &str {
        "polytope-manager"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.spin = (self.spin + self.speed * elapsed.as_secs_f32()) % TAU;
        Ok(())
    }

    fn draw(&self, target: &mut Image, view: &View) {
        let projection = self.projection.get();
        let color = Rgb::new(0.9, 0.9, 0.95);
        for &[a, b] in &self.edges {
            let (from, to) = (self.vertices[a], self.vertices[b]);
            for step in 0..=8 {
                let t = step as f32 / 8.0;
                let mut point: [f32; 4] = std::array::from_fn(|i| from[i] + (to[i] - from[i]) * t);
                (point[0], point[1]) = rotate(point[0], point[1], self.spin);
                view.plot(target, projection.project(point), color);
            }
        }
    }
}

/// Orbit camera slowly circling the origin.
#[derive(Debug, Clone)]
pub struct OrbitalCamera {
    azimuth: f32,
    elevation: f32,
    distance: f32,
    /// Azimuth change in rad/s.
    auto_rotate: f32,
}

impl OrbitalCamera {
    pub fn new(distance: f32, auto_rotate: f32) -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.35,
            distance,
            auto_rotate,
        }
    }

    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }
}

impl Default for OrbitalCamera {
    fn default() -> Self {
        Self::new(4.0, 0.1)
    }
}

impl Subsystem for OrbitalCamera {
    fn name(&self) -> &str {
        "orbital-camera"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.azimuth = (self.azimuth + self.auto_rotate * elapsed.as_secs_f32()) % TAU;
        Ok(())
    }

    fn view(&self) -> Option<View> {
        Some(View {
            azimuth: self.azimuth,
            elevation: self.elevation,
            distance: self.distance,
            ..View::default()
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Particle {
    home: [f32; 3],
    phase: f32,
}

/// Drifting particles seeded from mesh vertices.
#[derive(Debug)]
pub struct ParticleLayer {
    projection: ProjectionHandle,
    particles: Vec<Particle>,
    tint: Rgb,
    time: f32,
}

impl ParticleLayer {
    pub fn new(projection: ProjectionHandle, tint: Rgb) -> Self {
        Self {
            projection,
            particles: Vec::new(),
            tint,
            time: 0.0,
        }
    }

    /// Adds one particle per mesh vertex, scaled about the origin.
    pub fn add_mesh(&mut self, mesh: &Mesh, scale: f32) {
        let offset = self.particles.len();
        self.particles
            .extend(mesh.vertices.iter().enumerate().map(|(i, v)| Particle {
                home: v.map(|c| c * scale),
                phase: (offset + i) as f32 * 0.618,
            }));
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

impl Subsystem for ParticleLayer {
    fn name(&self) -> &str {
        "dandruff"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.time += elapsed.as_secs_f32();
        Ok(())
    }

    fn draw(&self, target: &mut Image, view: &View) {
        let projection = self.projection.get();
        for particle in &self.particles {
            let wave = (self.time + particle.phase).sin();
            let [x, y, z] = particle.home.map(|c| c * (1.0 + 0.05 * wave));
            view.plot(target, projection.project([x, y, z, 0.3 * wave]), self.tint);
        }
    }
}

/// Hopf fibres: great circles on the 3-sphere, one per base latitude.
#[derive(Debug)]
pub struct FibrationManager {
    projection: ProjectionHandle,
    etas: Vec<f32>,
    phase: f32,
    speed: f32,
}

impl FibrationManager {
    pub fn new(projection: ProjectionHandle, fibers: usize) -> Self {
        let etas = (0..fibers)
            .map(|i| (i as f32 + 0.5) / fibers as f32 * std::f32::consts::FRAC_PI_2)
            .collect();
        Self {
            projection,
            etas,
            phase: 0.0,
            speed: 0.5,
        }
    }

    pub fn fiber_count(&self) -> usize {
        self.etas.len()
    }
}

impl Subsystem for FibrationManager {
    fn name(&self) -> &str {
        "fibration-manager"
    }

    fn update(&mut self, elapsed: Duration) -> Result<()> {
        self.phase = (self.phase + self.speed * elapsed.as_secs_f32()) % TAU;
        Ok(())
    }

    fn draw(&self, target: &mut Image, view: &View) {
        let projection = self.projection.get();
        for (index, &eta) in self.etas.iter().enumerate() {
            let color = Rgb::new(0.2, 0.4 + 0.6 * eta.sin(), 0.8);
            let offset = index as f32 * 0.9;
            for step in 0..48 {
                let t = step as f32 / 48.0 * TAU;
                let point = [
                    eta.cos() * (t + offset).cos(),
                    eta.cos() * (t + offset).sin(),
                    eta.sin() * (t + self.phase).cos(),
                    eta.sin() * (t + self.phase).sin(),
                ];
                view.plot(target, projection.project(point), color);
            }
        }
    }
}
