use approx::assert_relative_eq;
use glacier_sim::grid::{Decomposition, GridLevel};
use glacier_sim::physics::NewtonianFlowLaw;
use glacier_sim::stressbalance::UniformSliding;
use glacier_sim::{Array2, Array3, Blatter, Config, HorizontalGrid, NodeType, StressBalanceInputs, VerticalGrid};
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Slab {
    bed: Array2<f64>,
    thickness: Array2<f64>,
    sea_level: Array2<f64>,
    hardness: Array3<f64>,
}

impl Slab {
    fn new(grid: &HorizontalGrid, vertical: &VerticalGrid, thickness: f64, hardness: f64) -> Self {
        Self {
            bed: Array2::filled(grid.mx, grid.my, 100.0),
            thickness: Array2::filled(grid.mx, grid.my, thickness),
            sea_level: Array2::filled(grid.mx, grid.my, 0.0),
            hardness: Array3::filled(grid.mx, grid.my, vertical.mz(), hardness),
        }
    }

    fn inputs(&self) -> StressBalanceInputs<'_> {
        StressBalanceInputs {
            bed: Some(&self.bed),
            thickness: Some(&self.thickness),
            sea_level: Some(&self.sea_level),
            hardness: Some(&self.hardness),
            ..Default::default()
        }
    }
}

fn setup() -> (Config, HorizontalGrid, VerticalGrid) {
    let mut config = Config::default();
    config.stress_balance.n_levels = 3;
    config.stress_balance.mz = 5;
    config.stress_balance.partitions = [2, 2];
    let grid = HorizontalGrid::from_bounds(11, 9, [0.0, 10e3], [0.0, 8e3]).unwrap();
    let vertical = VerticalGrid::equal(1000.0, 11).unwrap();
    (config, grid, vertical)
}

#[test]
fn test_flat_slab_without_forcing_has_zero_velocity() {
    let (config, grid, vertical) = setup();
    let mut blatter = Blatter::new(&config, &grid, &vertical).unwrap();
    let slab = Slab::new(&grid, &vertical, 600.0, config.stress_balance.isothermal_hardness());

    let stats = blatter.update(&slab.inputs()).unwrap();
    assert!(stats.converged);
    assert!(stats.newton_iterations <= 1);
    let velocity = blatter.velocity3d();
    assert!(velocity.u.iter().chain(velocity.v.iter()).chain(velocity.w.iter()).all(|&x| x == 0.0));
    assert!(blatter.strain_heating().iter().all(|&s| s == 0.0));
}

#[test]
fn test_uniform_sliding_gives_plug_flow() {
    let (config, grid, vertical) = setup();
    let sliding = Vector2::new(3.0e-6, -1.0e-6);
    let mut blatter = Blatter::with_flow_law(&config, &grid, &vertical, Box::new(NewtonianFlowLaw))
        .unwrap()
        .with_forcing(Box::new(UniformSliding { velocity: sliding }));
    let slab = Slab::new(&grid, &vertical, 600.0, 1.0e13);

    let stats = blatter.update(&slab.inputs()).unwrap();
    assert!(stats.converged);

    let velocity = blatter.velocity3d();
    for j in 0..grid.my {
        for i in 0..grid.mx {
            for k in 0..vertical.mz() {
                assert_relative_eq!(velocity.u[(i, j, k)], sliding.x, max_relative = 1e-4);
                assert_relative_eq!(velocity.v[(i, j, k)], sliding.y, max_relative = 1e-4);
                assert!(velocity.w[(i, j, k)].abs() < 1e-9);
            }
        }
    }
}

#[test]
fn test_second_solve_is_warm_started() {
    let (config, grid, vertical) = setup();
    let mut blatter = Blatter::with_flow_law(&config, &grid, &vertical, Box::new(NewtonianFlowLaw))
        .unwrap()
        .with_forcing(Box::new(UniformSliding { velocity: Vector2::new(1.0e-6, 0.0) }));
    let slab = Slab::new(&grid, &vertical, 600.0, 1.0e13);

    let first = blatter.update(&slab.inputs()).unwrap();
    let second = blatter.update(&slab.inputs()).unwrap();
    assert!(second.converged);
    assert!(second.initial_residual < first.initial_residual);
}

fn rank(t: NodeType) -> u8 {
    match t {
        NodeType::Exterior => 0,
        NodeType::Boundary => 1,
        NodeType::Interior => 2,
    }
}

#[test]
fn test_node_types_are_monotonic_in_thickness() {
    let (mx, my) = (9, 7);
    let min_thickness = 0.1;
    let mut level =
        GridLevel::new(mx, my, 3, 0.0, 0.0, 100.0, 100.0, min_thickness, Decomposition::serial(mx, my).unwrap())
            .unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..200 {
        for j in 0..my {
            for i in 0..mx {
                // about half of the nodes start ice-free
                level.params.get_mut(i, j).thickness = rng.gen_range(-1.0..1.0_f64).max(0.0) * min_thickness * 2.0;
            }
        }
        level.compute_node_types();
        let before: Vec<NodeType> = level.params.iter().map(|p| p.node_type).collect();

        for j in 0..my {
            for i in 0..mx {
                level.params.get_mut(i, j).thickness += rng.gen_range(0.0..0.15);
            }
        }
        level.compute_node_types();

        for j in 0..my {
            for i in 0..mx {
                let p = level.params.get(i, j);
                let old = before[level.params.index(i, j)];
                assert!(rank(p.node_type) >= rank(old), "node ({}, {}) went from {:?} to {:?}", i, j, old, p.node_type);
                if p.thickness >= min_thickness {
                    assert_ne!(p.node_type, NodeType::Exterior);
                }
            }
        }
    }
}
