use lasso_select::grid::{linear_spaced, log_spaced};
use lasso_select::model::{Coefficient, FitConfig, FitError, Model, ModelFitter};
use lasso_select::search::{CandidateOutcome, penalty_grid_search};
use lasso_select::solver::CoordinateDescentFitter;
use lasso_select::sparsity::{SparsitySettings, bracket_from_counts, sparsity_search};
use lasso_select::split::{SplitPlan, partition, random_split};
use lasso_select::table::SalesTable;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Normal, Uniform};
use std::collections::HashSet;

/// Sixteen rows and eight mutually orthogonal, zero-mean +-1 columns built from
/// the bits of the row index. Feature `fj` enters the target with weight
/// `10 * (j + 1)`, so with unit-norm columns it drops out once the penalty
/// reaches `80 * (j + 1)`.
fn walsh_table() -> (SalesTable, Vec<String>) {
    let sign = |row: usize, bits: &[usize]| -> f64 {
        let ones = bits.iter().filter(|&&b| (row >> b) & 1 == 1).count();
        if ones % 2 == 0 { 1.0 } else { -1.0 }
    };
    let patterns: [&[usize]; 8] = [&[0], &[1], &[2], &[3], &[0, 1], &[0, 2], &[0, 3], &[1, 2]];

    let mut price = Array1::from_elem(16, 500.0);
    let mut columns = Vec::new();
    let mut names = Vec::new();
    for (j, &bits) in patterns.iter().enumerate() {
        let column: Array1<f64> = (0..16).map(|row| sign(row, bits)).collect();
        price.scaled_add(10.0 * (j + 1) as f64, &column);
        names.push(format!("f{j}"));
        columns.push((format!("f{j}"), column));
    }
    columns.insert(0, ("price".to_string(), price));
    (SalesTable::new(columns).unwrap(), names)
}

/// Noisy housing-like rows with a handful of informative columns.
fn synthetic_sales(rows: usize, seed: u64) -> (SalesTable, Vec<String>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let sqft = Uniform::new(600.0, 4500.0);
    let grade = Uniform::<f64>::new(3.0, 13.0);
    let noise = Normal::new(0.0, 25_000.0).unwrap();

    let sqft_living: Array1<f64> = (0..rows).map(|_| rng.sample(&sqft)).collect();
    let grades: Array1<f64> = (0..rows).map(|_| rng.sample(&grade).floor()).collect();
    let view: Array1<f64> = (0..rows).map(|_| rng.gen_range(0..5) as f64).collect();
    let price: Array1<f64> = (0..rows)
        .map(|i| 40_000.0 + 180.0 * sqft_living[i] + 12_000.0 * grades[i] + rng.sample(&noise))
        .collect();

    let table = SalesTable::new(vec![
        ("price".to_string(), price),
        ("sqft_living".to_string(), sqft_living),
        ("grade".to_string(), grades),
        ("view".to_string(), view),
    ])
    .unwrap();
    let features = ["sqft_living", "grade", "view"].map(String::from).to_vec();
    (table, features)
}

#[test]
fn split_is_deterministic_for_a_seed() {
    let (table, _) = synthetic_sales(500, 3);
    let (a1, b1) = random_split(&table, 0.8, 11).unwrap();
    let (a2, b2) = random_split(&table, 0.8, 11).unwrap();
    assert_eq!(a1.row_ids(), a2.row_ids());
    assert_eq!(b1.row_ids(), b2.row_ids());

    let (a3, _) = random_split(&table, 0.8, 12).unwrap();
    assert_ne!(a1.row_ids(), a3.row_ids());
}

#[test]
fn partition_covers_every_row_exactly_once() {
    let (table, _) = synthetic_sales(2000, 5);
    let data = partition(&table, &SplitPlan::default()).unwrap();

    let mut seen = HashSet::new();
    for subset in [&data.training, &data.validation, &data.test] {
        for &id in subset.row_ids() {
            assert!(seen.insert(id), "row {id} landed in two subsets");
        }
    }
    assert_eq!(seen, (0..2000).collect::<HashSet<usize>>());

    // 0.9 * 0.5 of the rows each for training and validation, 0.1 for test.
    let share = |t: &SalesTable| t.n_rows() as f64 / 2000.0;
    assert!((share(&data.test) - 0.1).abs() < 0.03);
    assert!((share(&data.training) - 0.45).abs() < 0.05);
    assert!((share(&data.validation) - 0.45).abs() < 0.05);
}

#[test]
fn nonzero_count_never_rises_on_orthogonal_data() {
    let (table, features) = walsh_table();
    let base = FitConfig::new("price", &features);
    let fitter = CoordinateDescentFitter::default();

    let counts: Vec<usize> = linear_spaced(0.0, 800.0, 41)
        .into_iter()
        .map(|penalty| {
            fitter
                .fit(&table, &base.with_l1_penalty(penalty))
                .unwrap()
                .nonzero_count()
        })
        .collect();

    assert_eq!(counts[0], 9);
    assert_eq!(*counts.last().unwrap(), 1);
    assert!(counts.windows(2).all(|w| w[1] <= w[0]), "counts {counts:?}");
}

#[test]
fn grid_search_with_the_solver_is_repeatable() {
    let (table, features) = synthetic_sales(400, 17);
    let data = partition(&table, &SplitPlan::default()).unwrap();
    let base = FitConfig::new("price", &features);
    let penalties = log_spaced(1.0, 7.0, 13);
    let fitter = CoordinateDescentFitter::default();

    let first =
        penalty_grid_search(&fitter, &data.training, &data.validation, &base, &penalties).unwrap();
    let second =
        penalty_grid_search(&fitter, &data.training, &data.validation, &base, &penalties).unwrap();

    assert_eq!(first.best, second.best);
    assert_eq!(first.evaluations, second.evaluations);
    assert_eq!(first.model, second.model);

    let lowest = first
        .evaluations
        .iter()
        .filter_map(|e| e.rss())
        .fold(f64::INFINITY, f64::min);
    assert_eq!(first.best.rss, lowest);
}

#[test]
fn scenario_middle_penalty_wins() {
    let scores: [(f64, f64); 3] = [(10.0, 5e14), (100.0, 4e14), (1000.0, 6e14)];
    let fitter = |_: &SalesTable, cfg: &FitConfig| -> Result<Model, FitError> {
        let (_, rss) = scores
            .iter()
            .find(|(p, _)| *p == cfg.l1_penalty)
            .ok_or_else(|| FitError::Solver("unexpected penalty".to_string()))?;
        Ok(Model::new(
            rss.sqrt(),
            vec![Coefficient {
                name: "x".to_string(),
                value: 0.0,
            }],
        ))
    };
    let validation = SalesTable::new(vec![
        ("price".to_string(), Array1::zeros(1)),
        ("x".to_string(), Array1::zeros(1)),
    ])
    .unwrap();
    let base = FitConfig::new("price", &["x".to_string()]);

    let report =
        penalty_grid_search(&fitter, &validation, &validation, &base, &[10.0, 100.0, 1000.0])
            .unwrap();
    assert_eq!(report.best.penalty, 100.0);
    approx::assert_relative_eq!(report.best.rss, 4e14, max_relative = 1e-12);
}

#[test]
fn scenario_bracket_from_coarse_counts() {
    let counts = [(3.0e9, 8), (3.3e9, 8), (3.8e9, 6), (4.8e9, 5)];
    assert_eq!(bracket_from_counts(&counts, 7).unwrap(), (3.3e9, 3.8e9));
}

#[test]
fn sparsity_search_finds_the_exact_count_with_the_solver() {
    let (table, features) = walsh_table();
    let base = FitConfig::new("price", &features);
    let settings = SparsitySettings {
        target_nonzeros: 4,
        refinement_steps: 20,
    };

    let report = sparsity_search(
        &CoordinateDescentFitter::default(),
        &table,
        &table,
        &base,
        &log_spaced(2.0, 3.0, 11),
        &settings,
    )
    .unwrap();

    // Five terms survive up to 400, three from 480 on.
    assert!(report.bracket.monotone);
    assert!(report.bracket.penalty_min < 400.0);
    assert!(report.bracket.penalty_max >= 480.0);

    let selection = &report.selection;
    assert_eq!(selection.model.nonzero_count(), 4);
    assert!((400.0..480.0).contains(&selection.penalty));

    // Less shrinkage fits better, so the smallest qualifying penalty wins.
    let smallest_match = selection
        .evaluations
        .iter()
        .find(|e| matches!(e.outcome, CandidateOutcome::Scored { nonzeros: 4, .. }))
        .unwrap();
    assert_eq!(selection.penalty, smallest_match.penalty);
}
