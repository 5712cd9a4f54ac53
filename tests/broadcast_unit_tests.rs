extern crate rayon;
extern crate recal_genome;

use rayon::prelude::*;
use recal_genome::processing::broadcast::Broadcaster;
use recal_genome::recalibration::recalibration_report::RecalibrationReport;
use recal_genome::utils::errors::RecalError;
use std::sync::Arc;

#[test]
fn test_publish_and_resolve() {
    let broadcaster = Broadcaster::new();
    assert!(!broadcaster.is_published());

    let handle = broadcaster
        .publish(RecalibrationReport::with_global_delta(-1.5))
        .unwrap();
    assert!(broadcaster.is_published());

    let report = handle.resolve().unwrap();
    assert_eq!(report.global_delta(), -1.5);
    assert_eq!(handle.value().unwrap().global_delta(), -1.5);
}

#[test]
fn test_every_worker_sees_the_same_value() {
    let broadcaster = Broadcaster::new();
    let handle = broadcaster.publish(vec![1u8, 2, 3]).unwrap();
    let published = handle.resolve().unwrap();

    let all_shared = (0..64)
        .into_par_iter()
        .map_init(
            || handle.clone(),
            |worker_handle, _| Arc::ptr_eq(&worker_handle.resolve().unwrap(), &published),
        )
        .all(|shared| shared);
    assert!(all_shared);
}

#[test]
fn test_second_publish_is_rejected() {
    let broadcaster = Broadcaster::new();
    let handle = broadcaster.publish(1).unwrap();

    let err = broadcaster.publish(2).unwrap_err();
    assert!(matches!(err, RecalError::Distribution { .. }));
    assert_eq!(*handle.resolve().unwrap(), 1);
}

#[test]
fn test_resolve_before_publish() {
    let broadcaster = Broadcaster::<RecalibrationReport>::new();
    let handle = broadcaster.handle();

    assert!(matches!(
        handle.resolve(),
        Err(RecalError::Distribution { .. })
    ));

    broadcaster
        .publish(RecalibrationReport::with_global_delta(0.0))
        .unwrap();
    assert!(handle.resolve().is_ok());
}
