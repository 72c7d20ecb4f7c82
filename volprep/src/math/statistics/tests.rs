use super::*;

#[test]
fn test_mean_std_population() {
    let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
    assert!((mean - 5.0).abs() < 1e-12);
    assert!((std - 2.0).abs() < 1e-12);
}

#[test]
fn test_mean_std_empty() {
    assert!(mean_std(&[]).is_none());
}

#[test]
fn test_median_odd_and_even() {
    assert_eq!(median_f32_mut(&mut [5.0, 1.0, 3.0]), 3.0);
    assert_eq!(median_f32_mut(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    assert_eq!(median_f32_mut(&mut [7.0]), 7.0);
}

#[test]
fn test_percentile_endpoints_are_min_and_max() {
    let values = [3.0, -2.0, 10.0, 4.5, 0.0];
    assert_eq!(percentile_f32_mut(&mut values.clone(), 0.0), -2.0);
    assert_eq!(percentile_f32_mut(&mut values.clone(), 100.0), 10.0);
}

#[test]
fn test_percentile_interpolates_linearly() {
    // Sorted: 0, 10, 20, 30, 40. 25th percentile sits exactly on rank 1,
    // 90th percentile is 60% of the way from 30 to 40.
    let values = [40.0, 0.0, 30.0, 10.0, 20.0];
    assert_eq!(percentile_f32_mut(&mut values.clone(), 25.0), 10.0);
    let p90 = percentile_f32_mut(&mut values.clone(), 90.0);
    assert!((p90 - 36.0).abs() < 1e-5, "p90 = {p90}");
}

#[test]
fn test_percentile_pair_matches_individual_calls() {
    let values: Vec<f32> = (0..1001).map(|i| ((i * 7919) % 1001) as f32).collect();
    let mut scratch = Vec::new();
    let (lo, hi) = percentile_pair(&values, 0.01, 99.99, &mut scratch);
    assert!((lo - 0.1).abs() < 1e-4, "lo = {lo}");
    assert!((hi - 999.9).abs() < 1e-3, "hi = {hi}");
    assert_eq!(percentile_f32_mut(&mut values.clone(), 0.01), lo);
}

#[test]
fn test_percentile_of_constant_data() {
    let mut values = vec![2.5f32; 17];
    assert_eq!(percentile_f32_mut(&mut values, 37.0), 2.5);
}
