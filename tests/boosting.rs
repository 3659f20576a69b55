//! End-to-end training behavior across the loss families.

use approx::assert_abs_diff_eq;
use rstest::rstest;

use sgboost::data::SurvivalRecords;
use sgboost::training::Verbosity;
use sgboost::tree::SplitRule;
use sgboost::{BoostParams, Booster, DistConfig, Dataset, FeatureKind};

fn config_for(family: &str) -> DistConfig {
    let config = DistConfig::new(family);
    if family == "tdist" {
        config.with_df(4.0)
    } else {
        config
    }
}

/// One-feature dataset with a response shaped for the given family.
fn dataset_for(family: &str, n: usize) -> Dataset {
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let high = |i: usize| i > n / 2;
    let y: Vec<f64> = match family {
        "gaussian" | "tdist" => xs.iter().map(|&x| 0.1 * x).collect(),
        "bernoulli" | "adaboost" | "huberized" | "pairwise" => {
            (0..n).map(|i| if high(i) { 1.0 } else { 0.0 }).collect()
        }
        "poisson" => (0..n).map(|i| if high(i) { 3.0 } else { 1.0 }).collect(),
        "gamma" => (0..n).map(|i| if high(i) { 4.0 } else { 0.5 }).collect(),
        "coxph" => vec![0.0; n],
        other => panic!("no dataset shape for {other}"),
    };
    let data = Dataset::new(vec![xs], vec![FeatureKind::Continuous], y).unwrap();
    match family {
        "coxph" => data
            .with_survival(SurvivalRecords {
                start: (0..n).map(|i| i as f64 * 0.1).collect(),
                // early rows fail fast, late rows survive long
                stop: (0..n)
                    .map(|i| i as f64 * 0.1 + if high(i) { 20.0 } else { 1.0 })
                    .collect(),
                status: vec![1.0; n],
                strata: None,
            })
            .unwrap(),
        "pairwise" => data
            .with_groups((0..n as u32).map(|i| i / 10).collect())
            .unwrap(),
        _ => data,
    }
}

fn quiet(n_rounds: usize, shrinkage: f64) -> BoostParams {
    BoostParams {
        n_rounds,
        shrinkage,
        bag_fraction: 0.5,
        max_terminal_nodes: 3,
        min_node_obs: 3,
        col_fraction: 1.0,
        seed: 7,
        verbosity: Verbosity::Silent,
    }
}

// ---- Zero-shrinkage Tests ----

#[rstest]
#[case("gaussian")]
#[case("bernoulli")]
#[case("poisson")]
#[case("gamma")]
#[case("adaboost")]
#[case("huberized")]
#[case("tdist")]
#[case("coxph")]
#[case("pairwise")]
fn zero_shrinkage_round_is_a_no_op(#[case] family: &str) {
    let data = dataset_for(family, 40);
    let mut booster = Booster::new(&config_for(family), quiet(3, 0.0)).unwrap();
    let fit = booster.fit(&data).unwrap();
    let first = fit.train_deviance[0];
    for &dev in &fit.train_deviance {
        assert_abs_diff_eq!(dev, first, epsilon = 1e-12);
    }
    for &p in &fit.train_predictions {
        assert_abs_diff_eq!(p, fit.init_estimate);
    }
}

// ---- Descent Tests ----

#[rstest]
#[case("gaussian")]
#[case("bernoulli")]
#[case("poisson")]
#[case("gamma")]
#[case("tdist")]
fn training_deviance_descends(#[case] family: &str) {
    let data = dataset_for(family, 60);
    let params = BoostParams {
        bag_fraction: 1.0,
        ..quiet(30, 0.1)
    };
    let mut booster = Booster::new(&config_for(family), params).unwrap();
    let fit = booster.fit(&data).unwrap();
    let first = fit.train_deviance[0];
    let last = *fit.train_deviance.last().unwrap();
    assert!(
        last < first,
        "{family}: deviance went {first} -> {last}"
    );
    // full-bag descent is monotone up to rounding
    for window in fit.train_deviance.windows(2) {
        assert!(window[1] <= window[0] + 1e-9);
    }
}

#[test]
fn cox_likelihood_improves_with_boosting() {
    let data = dataset_for("coxph", 40);
    let params = BoostParams {
        bag_fraction: 1.0,
        ..quiet(10, 0.1)
    };
    let mut booster = Booster::new(&config_for("coxph"), params).unwrap();
    let fit = booster.fit(&data).unwrap();
    assert!(fit.train_deviance.iter().all(|d| d.is_finite()));
    assert!(fit.train_deviance.last().unwrap() < &fit.train_deviance[0]);
}

#[test]
fn pairwise_ranking_improves_with_boosting() {
    let data = dataset_for("pairwise", 60);
    let params = BoostParams {
        bag_fraction: 1.0,
        ..quiet(15, 0.1)
    };
    let mut booster = Booster::new(&config_for("pairwise"), params).unwrap();
    let fit = booster.fit(&data).unwrap();
    assert!(fit.train_deviance.last().unwrap() < &fit.train_deviance[0]);
}

// ---- Structure Tests ----

#[test]
fn step_function_recovered_with_one_split() {
    // y = 1{x > 5} + small deterministic noise, x on a 0..10 grid
    let n = 100;
    let xs: Vec<f64> = (0..n).map(|i| i as f64 * 10.0 / (n - 1) as f64).collect();
    let y: Vec<f64> = xs
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let noise = ((i * 37) % 19) as f64 / 100.0 - 0.09;
            if x > 5.0 {
                1.0 + noise
            } else {
                noise
            }
        })
        .collect();
    let data = Dataset::new(vec![xs], vec![FeatureKind::Continuous], y).unwrap();

    let params = BoostParams {
        n_rounds: 1,
        shrinkage: 1.0,
        bag_fraction: 1.0,
        max_terminal_nodes: 3,
        min_node_obs: 10,
        ..BoostParams::default()
    };
    let mut booster = Booster::new(&DistConfig::new("gaussian"), params).unwrap();
    let fit = booster.fit(&data).unwrap();

    let tree = &fit.trees[0];
    let split = tree.root().split.as_ref().unwrap();
    match &split.rule {
        SplitRule::Numeric { threshold } => {
            assert!(
                (*threshold - 5.0).abs() < 1.0,
                "split landed at {threshold}"
            );
        }
        other => panic!("expected a numeric split, got {other:?}"),
    }
    let low = fit.predict_row(|_| 1.0);
    let high = fit.predict_row(|_| 9.0);
    assert!((low - 0.0).abs() < 0.2, "left prediction {low}");
    assert!((high - 1.0).abs() < 0.2, "right prediction {high}");
}

#[test]
fn increasing_constraint_yields_nondecreasing_predictions() {
    let n = 60;
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let y: Vec<f64> = xs.iter().map(|&x| 0.2 * x).collect();
    let data = Dataset::new(vec![xs.clone()], vec![FeatureKind::Continuous], y)
        .unwrap()
        .with_monotone(vec![1])
        .unwrap();
    let mut booster = Booster::new(&DistConfig::new("gaussian"), quiet(20, 0.2)).unwrap();
    let fit = booster.fit(&data).unwrap();
    let preds: Vec<f64> = xs.iter().map(|&x| fit.predict_row(|_| x)).collect();
    for pair in preds.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-9);
    }
}

#[test]
fn increasing_constraint_flattens_a_decreasing_trend() {
    let n = 40;
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let y: Vec<f64> = xs.iter().map(|&x| -0.2 * x).collect();
    let data = Dataset::new(vec![xs], vec![FeatureKind::Continuous], y)
        .unwrap()
        .with_monotone(vec![1])
        .unwrap();
    // full bag keeps the unsplit root's mean residual at exactly zero
    let params = BoostParams {
        bag_fraction: 1.0,
        ..quiet(5, 0.5)
    };
    let mut booster = Booster::new(&DistConfig::new("gaussian"), params).unwrap();
    let fit = booster.fit(&data).unwrap();
    // every candidate split violates the constraint, so nothing moves
    for &p in &fit.train_predictions {
        assert_abs_diff_eq!(p, fit.init_estimate, epsilon = 1e-9);
    }
}

#[test]
fn missing_feature_values_score_through_the_missing_branch() {
    let n = 50;
    let mut xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    for i in (0..n).step_by(10) {
        xs[i] = f64::NAN;
    }
    let y: Vec<f64> = (0..n)
        .map(|i| if xs[i].is_nan() { 5.0 } else if i > n / 2 { 1.0 } else { 0.0 })
        .collect();
    let data = Dataset::new(vec![xs], vec![FeatureKind::Continuous], y).unwrap();
    let mut booster = Booster::new(&DistConfig::new("gaussian"), quiet(10, 0.3)).unwrap();
    let fit = booster.fit(&data).unwrap();

    // missing rows carry a far-off response; the missing branch must absorb
    // it instead of contaminating the ordered sides
    let missing_pred = fit.predict_row(|_| f64::NAN);
    let low = fit.predict_row(|_| 2.0);
    let high = fit.predict_row(|_| 45.0);
    assert!(missing_pred > low);
    assert!(missing_pred > high);
}

// ---- Validation partition Tests ----

#[test]
fn validation_deviance_tracks_generalization() {
    let n = 80;
    let xs: Vec<f64> = (0..n).map(|i| (i % 40) as f64).collect();
    let y: Vec<f64> = xs.iter().map(|&x| if x > 20.0 { 1.0 } else { 0.0 }).collect();
    let data = Dataset::new(vec![xs], vec![FeatureKind::Continuous], y)
        .unwrap()
        .with_validation_rows(40)
        .unwrap();
    let params = BoostParams {
        bag_fraction: 1.0,
        ..quiet(20, 0.2)
    };
    let mut booster = Booster::new(&DistConfig::new("gaussian"), params).unwrap();
    let fit = booster.fit(&data).unwrap();
    // train and validation halves repeat the same pattern, so validation
    // deviance must come down with the fit
    assert!(fit.valid_deviance.last().unwrap() < &fit.valid_deviance[0]);
}
