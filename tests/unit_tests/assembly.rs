use multipoint::assembly::global::{MatrixAssembler, VectorAssembler};
use multipoint::assembly::local::{PrecomputedElementMatrices, PrecomputedElementVectors};
use multipoint::constraint::MultiPointConstraint;
use multipoint::error::ConstraintError;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;

use matrixcompare::assert_matrix_eq;

/// Nine interval cells over ten dofs, each contributing 1.0 to both endpoints.
fn interval_unit_form() -> PrecomputedElementVectors<f64> {
    let connectivity: Vec<Vec<usize>> = (0..9).map(|i| vec![i, i + 1]).collect();
    let vectors = vec![DVector::from_vec(vec![1.0, 1.0]); 9];
    PrecomputedElementVectors::new(10, connectivity, vectors).unwrap()
}

#[test]
fn unconstrained_vector_assembly_accumulates_per_dof() {
    let form = interval_unit_form();
    let mut mpc = MultiPointConstraint::<f64>::new(10);
    mpc.finalize().unwrap();

    let assembler = VectorAssembler::default();
    let b = assembler.assemble_vector(&form, &mpc, None).unwrap();

    assert_eq!(b.owned()[0], 1.0);
    for i in 1..9 {
        assert_eq!(b.owned()[i], 2.0);
    }
    assert_eq!(b.owned()[9], 1.0);
}

#[test]
fn periodic_pair_doubles_the_master_weight() {
    let form = interval_unit_form();
    let mut mpc = MultiPointConstraint::<f64>::new(10);
    mpc.add_relation(9, &[0], &[1.0], 0.0).unwrap();
    mpc.finalize().unwrap();

    let assembler = VectorAssembler::default();
    let b = assembler.assemble_vector(&form, &mpc, None).unwrap();

    // Dof 9's boundary contribution lands on its master
    assert_eq!(b.owned()[0], 2.0);
    for i in 1..9 {
        assert_eq!(b.owned()[i], 2.0);
    }
    assert_eq!(b.owned()[9], 0.0);
}

#[test]
fn assembly_is_bitwise_reproducible() {
    let form = interval_unit_form();
    let mut mpc = MultiPointConstraint::<f64>::new(10);
    mpc.add_relation(9, &[0], &[0.5], 0.0).unwrap();
    mpc.finalize().unwrap();

    let assembler = VectorAssembler::default();
    let b1 = assembler.assemble_vector(&form, &mpc, None).unwrap();
    let b2 = assembler.assemble_vector(&form, &mpc, None).unwrap();
    assert_eq!(b1, b2);
}

#[test]
fn provided_target_is_zeroed_before_accumulation() {
    let form = interval_unit_form();
    let mut mpc = MultiPointConstraint::<f64>::new(10);
    mpc.finalize().unwrap();

    let assembler = VectorAssembler::default();
    let mut stale = mpc.create_vector();
    {
        let mut stale_local = stale.local_form();
        stale_local.add(3, 100.0);
    }
    let b = assembler.assemble_vector(&form, &mpc, Some(stale)).unwrap();
    let fresh = assembler.assemble_vector(&form, &mpc, None).unwrap();
    assert_eq!(b, fresh);
}

#[test]
fn explicit_accumulation_is_cumulative() {
    let form = interval_unit_form();
    let mut mpc = MultiPointConstraint::<f64>::new(10);
    mpc.finalize().unwrap();

    let assembler = VectorAssembler::default();
    let mut b = mpc.create_vector();
    assembler
        .assemble_vector_accumulate(&form, &mpc, &mut b)
        .unwrap();
    assembler
        .assemble_vector_accumulate(&form, &mpc, &mut b)
        .unwrap();
    assert_eq!(b.owned()[0], 2.0);
    assert_eq!(b.owned()[4], 4.0);
}

#[test]
fn assembly_requires_a_finalized_store() {
    let form = interval_unit_form();
    let mpc = MultiPointConstraint::<f64>::new(10);
    let assembler = VectorAssembler::default();
    assert!(assembler.assemble_vector(&form, &mpc, None).is_err());
}

#[test]
fn assembly_rejects_forms_exceeding_the_index_map() {
    // The form addresses dofs the constraint's index map does not store
    let connectivity = vec![vec![10, 11]];
    let vectors = vec![DVector::from_vec(vec![1.0, 1.0])];
    let form = PrecomputedElementVectors::new(12, connectivity, vectors).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(10);
    mpc.finalize().unwrap();

    let assembler = VectorAssembler::default();
    assert!(assembler.assemble_vector(&form, &mpc, None).is_err());
}

#[test]
fn depth_guard_error_propagates_out_of_assembly() {
    let form = interval_unit_form();
    let mut mpc = MultiPointConstraint::<f64>::new(10);
    mpc.add_relation(0, &[1], &[1.0], 0.0).unwrap();
    mpc.add_relation(1, &[2], &[1.0], 0.0).unwrap();
    mpc.finalize().unwrap();

    let assembler = VectorAssembler::default().with_max_expansion_depth(1);
    let err = assembler.assemble_vector(&form, &mpc, None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConstraintError>(),
        Some(&ConstraintError::ConstraintDepthExceeded {
            dof: 1,
            max_depth: 1
        })
    );
}

#[test]
fn unconstrained_pattern_covers_element_couplings() {
    let connectivity = vec![vec![0, 1], vec![1, 2]];
    let matrices = vec![DMatrix::repeat(2, 2, 1.0); 2];
    let form = PrecomputedElementMatrices::new(4, connectivity, matrices).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(4);
    mpc.finalize().unwrap();

    let assembler = MatrixAssembler::default();
    let pattern = assembler.assemble_pattern(&form, &mpc).unwrap();
    // Dof 3 touches no cell and gets an empty row
    let expected = SparsityPattern::try_from_offsets_and_indices(
        4,
        4,
        vec![0, 2, 5, 7, 7],
        vec![0, 1, 0, 1, 2, 1, 2],
    )
    .unwrap();
    assert_eq!(pattern, expected);
}

#[test]
fn constrained_matrix_redistributes_rows_and_columns() {
    let connectivity = vec![vec![0, 1, 2]];
    let matrices = vec![DMatrix::repeat(3, 3, 1.0)];
    let form = PrecomputedElementMatrices::new(3, connectivity, matrices).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(3);
    mpc.add_relation(2, &[0, 1], &[0.5, 0.5], 0.0).unwrap();
    mpc.finalize().unwrap();

    let assembler = MatrixAssembler::default();
    let matrix = assembler.assemble_matrix(&form, &mpc).unwrap();

    // Each unit entry of the 3x3 element matrix lands on the masters with
    // weight products, and the eliminated diagonal takes a representative
    // scale
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        2.25, 2.25, 0.0,
        2.25, 2.25, 0.0,
        0.0,  0.0,  2.25,
    ]);
    assert_matrix_eq!(DMatrix::from(&matrix), expected);
}

#[test]
fn constrained_pattern_keeps_slave_diagonal_only() {
    let connectivity = vec![vec![0, 1, 2]];
    let matrices = vec![DMatrix::repeat(3, 3, 1.0)];
    let form = PrecomputedElementMatrices::new(3, connectivity, matrices).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(3);
    mpc.add_relation(2, &[0, 1], &[0.5, 0.5], 0.0).unwrap();
    mpc.finalize().unwrap();

    let assembler = MatrixAssembler::default();
    let pattern = assembler.assemble_pattern(&form, &mpc).unwrap();
    let expected = SparsityPattern::try_from_offsets_and_indices(
        3,
        3,
        vec![0, 2, 4, 5],
        vec![0, 1, 0, 1, 2],
    )
    .unwrap();
    assert_eq!(pattern, expected);
}

#[test]
fn constrained_matrix_couples_masters_across_cells() {
    // Two cells; the second one is tied back onto the first through dof 3
    let connectivity = vec![vec![0, 1], vec![2, 3]];
    #[rustfmt::skip]
    let element = DMatrix::from_row_slice(2, 2, &[
        2.0, -1.0,
        -1.0, 2.0,
    ]);
    let matrices = vec![element.clone(), element];
    let form = PrecomputedElementMatrices::new(4, connectivity, matrices).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(4);
    mpc.add_relation(3, &[0], &[1.0], 0.0).unwrap();
    mpc.finalize().unwrap();

    let assembler = MatrixAssembler::default();
    let matrix = assembler.assemble_matrix(&form, &mpc).unwrap();

    // Cell 2 contributes its dof-3 row/column to dof 0
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
        4.0, -1.0, -1.0, 0.0,
        -1.0, 2.0,  0.0, 0.0,
        -1.0, 0.0,  2.0, 0.0,
        0.0,  0.0,  0.0, 4.0,
    ]);
    assert_matrix_eq!(DMatrix::from(&matrix), expected);
}
