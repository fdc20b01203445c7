//! Integration tests: index the same reflections under two settings of one
//! lattice and recover the operator relating them.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use hklindex::predict::{predict_reflections, rotation_from_euler_deg};
use hklindex::{
    assign_global, derive_change_of_basis, reindex_reflections, ChangeOfBasis, CrystalModel,
    GlobalAssignConfig, IndexingError, MillerIndex, UnitCell, Vector3,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

fn random_indices(n: usize, max: i32, rng: &mut StdRng) -> Vec<MillerIndex> {
    (0..n)
        .map(|_| {
            [
                rng.random_range(-max..=max),
                rng.random_range(-max..=max),
                rng.random_range(-max..=max),
            ]
        })
        .filter(|hkl| *hkl != [0, 0, 0])
        .collect()
}

#[test]
fn test_recover_operator_between_two_settings() {
    init_tracing();
    let cell = UnitCell::new(42.0, 51.0, 63.0, 90.0, 98.0, 90.0);
    let a = CrystalModel::from_unit_cell(&cell, &rotation_from_euler_deg([15.0, -40.0, 110.0]))
        .expect("valid cell");
    let cb_op: ChangeOfBasis = "-a-c,b,a".parse().expect("valid operator");
    assert!((cb_op.determinant().abs() - 1.0).abs() < 1e-12);
    let b = a.change_basis(&cb_op).expect("non-singular");

    let rlps: Vec<Vector3> = predict_reflections(&a, 5.0).iter().map(|r| r.rlp).collect();
    assert!(rlps.len() > 100);
    let config = GlobalAssignConfig::new(0.1);
    let under_a = assign_global(&rlps, &[a], &config);
    let under_b = assign_global(&rlps, &[b], &config);
    assert!(under_a.iter().all(|r| r.is_indexed()));
    assert!(under_b.iter().all(|r| r.is_indexed()));

    let hkl_a: Vec<MillerIndex> = under_a.iter().map(|r| r.miller_index).collect();
    let hkl_b: Vec<MillerIndex> = under_b.iter().map(|r| r.miller_index).collect();
    let found = derive_change_of_basis(&hkl_a, &hkl_b).expect("operator recovered");
    println!("recovered operator {} ({})", found, found.as_hkl());
    assert_eq!(found, cb_op);
    assert_eq!(
        derive_change_of_basis(&hkl_b, &hkl_a).expect("inverse recovered"),
        cb_op.inverse().expect("invertible")
    );

    let relabeled = reindex_reflections(&under_a, &found, None).expect("integral operator");
    for (r, expected) in relabeled.iter().zip(under_b.iter()) {
        assert_eq!(r.miller_index, expected.miller_index);
        assert_eq!(r.rlp, expected.rlp);
    }
}

#[test]
fn test_random_unimodular_operators_round_trip() {
    let mut rng = StdRng::seed_from_u64(11);
    let generators: Vec<ChangeOfBasis> = ["b,c,a", "-b,a,c", "a+b,b,c", "a,b+c,c", "-a,-b,c", "a,-c,b"]
        .iter()
        .map(|s| s.parse().expect("valid operator"))
        .collect();

    for _ in 0..20 {
        let mut m = ChangeOfBasis::identity();
        for _ in 0..4 {
            let pick = rng.random_range(0..generators.len());
            m = generators[pick].compose(&m).expect("small coefficients");
        }
        let from = random_indices(15, 12, &mut rng);
        assert!(from.len() >= 10);
        let to = m.apply_all(&from).expect("integral operator");
        let found = derive_change_of_basis(&from, &to).expect("operator recovered");
        assert_eq!(found, m, "expected {}, found {}", m, found);
        assert_eq!(found.apply_all(&from).expect("integral"), to);
    }
}

#[test]
fn test_supercell_operator() {
    let cb_op: ChangeOfBasis = "2a,b,c".parse().expect("valid operator");
    let from: Vec<MillerIndex> = vec![[1, 0, 0], [0, 1, 0], [0, 0, 1], [3, 2, -1], [-4, 1, 5]];
    let to = cb_op.apply_all(&from).expect("integral operator");
    let found = derive_change_of_basis(&from, &to).expect("operator recovered");
    assert_eq!(found.to_string(), "2*a,b,c");

    // The sub-cell direction needs a half-integer operator.
    let back = derive_change_of_basis(&to, &from).expect("operator recovered");
    assert_eq!(back.denominator(), 2);
    assert_eq!(back.to_string(), "1/2*a,b,c");
}

#[test]
fn test_too_few_pairs() {
    let from: Vec<MillerIndex> = vec![[1, 2, 3], [0, 0, 0], [2, 1, 0], [5, 5, 5]];
    let to: Vec<MillerIndex> = vec![[2, 1, 3], [1, 1, 1], [1, 2, 0], [0, 0, 0]];
    match derive_change_of_basis(&from, &to) {
        Err(IndexingError::InsufficientData { found, required }) => {
            assert_eq!(found, 2);
            assert_eq!(required, 3);
        }
        other => panic!("expected InsufficientData, got {:?}", other),
    }
}

#[test]
fn test_reindex_with_offset_and_unindexed() {
    let xtal = CrystalModel::from_unit_cell(&UnitCell::cubic(30.0), &nalgebra::Matrix3::identity())
        .expect("valid cell");
    let rlps = vec![
        xtal.predict_rlp(&[1, 2, 3]),
        Vector3::new(1.0 / 60.0, 0.0, 0.0), // halfway between lattice points
        xtal.predict_rlp(&[-1, 0, 0]),
    ];
    let assigned = assign_global(&rlps, &[xtal], &GlobalAssignConfig::new(0.2));
    assert!(!assigned[1].is_indexed());

    let cb_op: ChangeOfBasis = "l,h,k".parse().expect("valid operator");
    let out = reindex_reflections(&assigned, &cb_op, Some([1, 0, 0])).expect("integral operator");
    assert_eq!(out[0].miller_index, [4, 1, 2]);
    assert!(!out[1].is_indexed());
    // (-1, 0, 0) -> (0, -1, 0) -> offset (1, -1, 0)
    assert_eq!(out[2].miller_index, [1, -1, 0]);
}
