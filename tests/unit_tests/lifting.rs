use multipoint::assembly::global::apply_lifting;
use multipoint::assembly::local::{ElementMatrixAssembler, PrecomputedElementMatrices};
use multipoint::bc::DirichletBC;
use multipoint::constraint::MultiPointConstraint;
use multipoint::error::ConstraintError;
use nalgebra::DMatrix;

fn single_dof_operator(value: f64) -> PrecomputedElementMatrices<f64> {
    PrecomputedElementMatrices::new(1, vec![vec![0]], vec![DMatrix::from_element(1, 1, value)])
        .unwrap()
}

#[test]
fn lifting_subtracts_a_times_g_on_a_single_dof_system() {
    let operator = single_dof_operator(2.0);
    let bc = DirichletBC::new(vec![0], vec![3.0]).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(1);
    mpc.finalize().unwrap();

    let mut b = mpc.create_vector();
    {
        let mut b_local = b.local_form();
        b_local.add(0, 1.0);
    }
    apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[vec![bc]],
        &mpc,
        &[],
        1.0,
    )
    .unwrap();

    // b = 1 - 2 * 3
    assert_eq!(b.owned()[0], -5.0);
}

#[test]
fn lifting_with_x0_equal_to_g_is_a_no_op() {
    let operator = single_dof_operator(2.0);
    let bc = DirichletBC::new(vec![0], vec![3.0]).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(1);
    mpc.finalize().unwrap();

    let mut x0 = mpc.create_vector();
    {
        let mut x0_local = x0.local_form();
        x0_local.add(0, 3.0);
    }
    let mut b = mpc.create_vector();
    {
        let mut b_local = b.local_form();
        b_local.add(0, 1.0);
    }
    apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[vec![bc]],
        &mpc,
        &[x0],
        1.0,
    )
    .unwrap();

    assert_eq!(b.owned()[0], 1.0);
}

#[test]
fn lifting_scale_factors_the_correction() {
    let operator = single_dof_operator(2.0);
    let bc = DirichletBC::new(vec![0], vec![3.0]).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(1);
    mpc.finalize().unwrap();

    let mut b = mpc.create_vector();
    {
        let mut b_local = b.local_form();
        b_local.add(0, 1.0);
    }
    apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[vec![bc]],
        &mpc,
        &[],
        0.5,
    )
    .unwrap();

    // b = 1 - 0.5 * 2 * 3
    assert_eq!(b.owned()[0], -2.0);
}

#[test]
fn slave_offsets_lift_through_the_constraint_matrix() {
    // u1 = u0 + 2; the offset acts as a prescribed value on dof 1, and the
    // slave row of the correction redistributes onto dof 0
    let operator = PrecomputedElementMatrices::new(
        2,
        vec![vec![0, 1]],
        vec![DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0])],
    )
    .unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(2);
    mpc.add_relation(1, &[0], &[1.0], 2.0).unwrap();
    mpc.finalize().unwrap();

    let mut b = mpc.create_vector();
    apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[vec![]],
        &mpc,
        &[],
        1.0,
    )
    .unwrap();

    // g = [0, 2], A g = [2, 4]; row 0 subtracts 2 directly, row 1 expands
    // onto dof 0 and subtracts another 4
    assert_eq!(b.owned()[0], -6.0);
    assert_eq!(b.owned()[1], 0.0);
}

#[test]
fn lifting_skips_elements_without_prescribed_dofs() {
    let operator = PrecomputedElementMatrices::new(
        3,
        vec![vec![0, 1], vec![1, 2]],
        vec![
            DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]),
            DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]),
        ],
    )
    .unwrap();
    let bc = DirichletBC::new(vec![2], vec![1.0]).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(3);
    mpc.finalize().unwrap();

    let mut b = mpc.create_vector();
    apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[vec![bc]],
        &mpc,
        &[],
        1.0,
    )
    .unwrap();

    // Only the second cell touches the prescribed dof: A g = [-1, 2]
    assert_eq!(b.owned()[0], 0.0);
    assert_eq!(b.owned()[1], 1.0);
    assert_eq!(b.owned()[2], -2.0);
}

#[test]
fn dirichlet_bc_rejects_duplicate_dofs() {
    let err = DirichletBC::new(vec![2, 0, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
    assert_eq!(err, ConstraintError::DuplicatePrescribedValue { dof: 2 });
}

#[test]
fn dirichlet_bc_rejects_mismatched_lists() {
    let err = DirichletBC::<f64>::new(vec![0, 1], vec![1.0]).unwrap_err();
    assert_eq!(
        err,
        ConstraintError::LengthMismatch {
            what: "dofs/values",
            left: 2,
            right: 1
        }
    );
}

#[test]
fn lifting_rejects_forms_exceeding_the_index_map() {
    let operator = PrecomputedElementMatrices::new(
        2,
        vec![vec![1]],
        vec![DMatrix::from_element(1, 1, 2.0)],
    )
    .unwrap();
    let bc = DirichletBC::new(vec![1], vec![3.0]).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(1);
    mpc.finalize().unwrap();

    let mut b = mpc.create_vector();
    assert!(apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[vec![bc]],
        &mpc,
        &[],
        1.0,
    )
    .is_err());
}

#[test]
fn lifting_rejects_mismatched_forms_and_bcs() {
    let operator = single_dof_operator(2.0);
    let mut mpc = MultiPointConstraint::<f64>::new(1);
    mpc.finalize().unwrap();

    let mut b = mpc.create_vector();
    let err = apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[],
        &mpc,
        &[],
        1.0,
    )
    .unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConstraintError>(),
        Some(&ConstraintError::LengthMismatch {
            what: "forms/bcs",
            left: 1,
            right: 0
        })
    );
}

#[test]
fn lifting_rejects_mismatched_x0() {
    let operator = single_dof_operator(2.0);
    let bc = DirichletBC::new(vec![0], vec![3.0]).unwrap();
    let mut mpc = MultiPointConstraint::<f64>::new(1);
    mpc.finalize().unwrap();

    let mut b = mpc.create_vector();
    let x0 = vec![mpc.create_vector(), mpc.create_vector()];
    let err = apply_lifting(
        &mut b,
        &[&operator as &dyn ElementMatrixAssembler<f64>],
        &[vec![bc]],
        &mpc,
        &x0,
        1.0,
    )
    .unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConstraintError>(),
        Some(&ConstraintError::LengthMismatch {
            what: "forms/x0",
            left: 1,
            right: 2
        })
    );
}
