#![allow(non_snake_case)]

extern crate recal_genome;

use recal_genome::utils::interval_utils::IntervalUtils;
use recal_genome::utils::simple_interval::{CoordMath, Locatable, SimpleInterval};

#[test]
fn test_equality() {
    let i1 = SimpleInterval::new(1, 0, 100);
    let i2 = SimpleInterval::new(1, 0, 100);
    let i4 = SimpleInterval::new(1, 1, 100);
    let i5 = SimpleInterval::new(1, 0, 200);

    assert!(i1 == i1);
    assert!(i1 == i2);

    assert_ne!(i1, i4);
    assert_ne!(i1, i5);
    assert_ne!(i4, i5);
}

fn test_get_size(interval: SimpleInterval, expected_size: usize) {
    assert_eq!(
        interval.size(),
        expected_size,
        "Size incorrect for interval {:?} -> expected {} got {}",
        &interval,
        expected_size,
        interval.size()
    );
}

#[test]
fn test_interval_size() {
    test_get_size(SimpleInterval::new(1, 1, 1), 0);
    test_get_size(SimpleInterval::new(1, 1, 2), 1);
    test_get_size(SimpleInterval::new(1, 1, 10), 9);
    test_get_size(SimpleInterval::new(1, 2, 10), 8);
}

fn test_overlap(
    first_interval: &SimpleInterval,
    second_interval: SimpleInterval,
    expected_overlap_result: bool,
) {
    assert_eq!(
        first_interval.overlaps(&second_interval),
        expected_overlap_result,
        "Overlap returned incorrect result for intervals {:?} and {:?}",
        first_interval,
        second_interval
    )
}

#[test]
fn get_interval_overlap_data() {
    let standard_interval = SimpleInterval::new(1, 10, 20);
    let one_base_interval = SimpleInterval::new(1, 10, 11);

    test_overlap(&standard_interval, SimpleInterval::new(2, 10, 20), false);
    test_overlap(&standard_interval, SimpleInterval::new(1, 1, 5), false);
    test_overlap(&standard_interval, SimpleInterval::new(1, 1, 10), false);
    test_overlap(&standard_interval, SimpleInterval::new(1, 1, 11), true);
    test_overlap(&standard_interval, SimpleInterval::new(1, 1, 15), true);
    test_overlap(&standard_interval, SimpleInterval::new(1, 10, 15), true);
    test_overlap(&standard_interval, SimpleInterval::new(1, 10, 20), true);
    test_overlap(&standard_interval, SimpleInterval::new(1, 15, 25), true);
    test_overlap(&standard_interval, SimpleInterval::new(1, 19, 25), true);
    test_overlap(&standard_interval, SimpleInterval::new(1, 20, 25), false);
    test_overlap(&standard_interval, SimpleInterval::new(1, 25, 30), false);
    test_overlap(&one_base_interval, SimpleInterval::new(2, 10, 11), false);
    test_overlap(&one_base_interval, SimpleInterval::new(1, 1, 10), false);
    test_overlap(&one_base_interval, SimpleInterval::new(1, 1, 11), true);
    test_overlap(&one_base_interval, SimpleInterval::new(1, 10, 15), true);
    test_overlap(&one_base_interval, SimpleInterval::new(1, 11, 15), false);
    test_overlap(&standard_interval, standard_interval.clone(), true)
}

fn test_contains(
    first_interval: &SimpleInterval,
    second_interval: SimpleInterval,
    expected_contains_result: bool,
) {
    assert_eq!(
        first_interval.contains(&second_interval),
        expected_contains_result,
        "contains returned incorrect result for intervals {:?} and {:?}",
        first_interval,
        second_interval
    );
}

#[test]
fn get_interval_contains_data() {
    let containing_interval = SimpleInterval::new(1, 10, 20);
    test_contains(&containing_interval, SimpleInterval::new(2, 10, 20), false);
    test_contains(&containing_interval, SimpleInterval::new(1, 1, 5), false);
    test_contains(&containing_interval, SimpleInterval::new(1, 5, 15), false);
    test_contains(&containing_interval, SimpleInterval::new(1, 9, 20), false);
    test_contains(&containing_interval, SimpleInterval::new(1, 10, 15), true);
    test_contains(&containing_interval, SimpleInterval::new(1, 10, 20), true);
    test_contains(&containing_interval, SimpleInterval::new(1, 10, 21), false);
    test_contains(&containing_interval, SimpleInterval::new(1, 15, 25), false);
    test_contains(&containing_interval, SimpleInterval::new(1, 19, 20), true);
    test_contains(&containing_interval, SimpleInterval::new(1, 25, 30), false);
    test_contains(&containing_interval, containing_interval.clone(), true);
}

#[test]
fn test_not_contiguous_loc() {
    let loc1 = SimpleInterval::new(1, 10, 20);
    let loc2 = SimpleInterval::new(1, 22, 30);
    let loc4 = SimpleInterval::new(2, 20, 30);
    assert!(loc1.merge_with_contiguous(&loc2).is_err());
    assert!(loc1.merge_with_contiguous(&loc4).is_err());
}

#[test]
fn test_merge_contiguous() {
    let loc1 = SimpleInterval::new(1, 10, 20);
    let loc2 = SimpleInterval::new(1, 20, 30);
    let loc3 = SimpleInterval::new(1, 15, 30);
    assert_eq!(
        loc1.merge_with_contiguous(&loc2).unwrap(),
        SimpleInterval::new(1, 10, 30)
    );
    assert_eq!(
        loc1.merge_with_contiguous(&loc3).unwrap(),
        SimpleInterval::new(1, 10, 30)
    );
}

#[test]
fn test_intersect() {
    let loc1 = SimpleInterval::new(1, 10, 20);
    assert_eq!(
        loc1.intersect(&SimpleInterval::new(1, 15, 40)),
        Some(SimpleInterval::new(1, 15, 20))
    );
    assert_eq!(loc1.intersect(&SimpleInterval::new(1, 20, 40)), None);
    assert_eq!(loc1.intersect(&SimpleInterval::new(2, 15, 40)), None);
}

#[test]
fn test_cycles() {
    assert_eq!(CoordMath::get_cycle(false, 10, 0), 1);
    assert_eq!(CoordMath::get_cycle(false, 10, 9), 10);
    assert_eq!(CoordMath::get_cycle(true, 10, 0), 10);
    assert_eq!(CoordMath::get_cycle(true, 10, 9), 1);
}

#[test]
fn test_sort_and_merge() {
    let merged = IntervalUtils::sort_and_merge_intervals(vec![
        SimpleInterval::new(1, 50, 60),
        SimpleInterval::new(0, 30, 40),
        SimpleInterval::new(0, 10, 20),
        SimpleInterval::new(0, 15, 30),
        SimpleInterval::new(1, 5, 5),
    ]);
    assert_eq!(
        merged,
        vec![
            SimpleInterval::new(0, 10, 40),
            SimpleInterval::new(1, 50, 60)
        ]
    );
}

#[test]
fn test_trim_interval_to_contig() {
    assert_eq!(
        IntervalUtils::trim_interval_to_contig(0, 10, 2000, 1000),
        Some(SimpleInterval::new(0, 10, 1000))
    );
    assert_eq!(IntervalUtils::trim_interval_to_contig(0, 1000, 2000, 1000), None);
}
