//! Pipeline runs against the scripted archive.

mod common;

use std::time::Duration;

use common::*;
use forecast_stack::{
    AssemblyError, BoundingBoxClipper, ConfigError, ForecastPipeline, ForecastRequest,
    PipelineError, RetryPolicy, TransportError,
};
use half::f16;
use nwp_common::{BoundingBox, GridShape};
use test_utils::{create_accumulated_precipitation, dwd_file_name, Grib2Builder};

fn request() -> ForecastRequest {
    ForecastRequest::new("icon-eu", "tot_prec", 4).unwrap()
}

fn pipeline(archive: &MockArchive) -> ForecastPipeline<MockArchive> {
    ForecastPipeline::new(archive.clone(), request())
        .with_retry_policy(RetryPolicy::fixed(Duration::ZERO))
}

// 11:30 with a 4 hour buffer selects the 06 run
fn now() -> chrono::DateTime<chrono::Utc> {
    jan_first(11, 30)
}

#[tokio::test]
async fn test_stacks_every_regular_file() {
    let archive = MockArchive::new();
    let dir = icon_eu_run(&archive, &[0, 1, 2]);

    let result = pipeline(&archive).run::<f32>(now()).await.unwrap();

    assert_eq!(result.run.designator(), "06");
    assert_eq!(result.stack.depth(), 3);
    assert_eq!(result.stack.shape(), GridShape::new(4, 5));
    assert_eq!(result.timestamps().len(), result.stack.depth());
    assert_eq!(result.footprint.len(), 20);

    assert_eq!(archive.connects(), 1);
    assert_eq!(archive.navigations(), vec![dir]);
    assert_eq!(archive.retrievals().len(), 3);
    assert!(archive.retrievals().iter().all(|n| n.contains("regular")));
    assert_eq!(archive.quits(), 1);
}

#[tokio::test]
async fn test_non_chronological_listing() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[2, 0, 1]);

    let result = pipeline(&archive).run::<f32>(now()).await.unwrap();

    assert_eq!(
        result.timestamps(),
        &[jan_first(6, 0), jan_first(7, 0), jan_first(8, 0)]
    );
    assert_eq!(
        result.stack.frame_timestamps(),
        &[jan_first(8, 0), jan_first(6, 0), jan_first(7, 0)]
    );

    // Frames keep retrieval order: frame 0 is lead 2
    let expected = create_accumulated_precipitation(5, 4, 42, 2);
    let frame = result.stack.frame(0).unwrap();
    for (got, want) in frame.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-3, "{} != {}", got, want);
    }
}

#[tokio::test]
async fn test_mid_transfer_failure_reconnects_once() {
    let archive = MockArchive::new();
    let dir = icon_eu_run(&archive, &[0, 1, 2]);
    archive.fail_retrieval(&icon_eu_name(1), 1);

    let result = pipeline(&archive).run::<f32>(now()).await.unwrap();

    assert_eq!(result.stack.depth(), 3);
    assert_eq!(archive.connects(), 2);
    assert_eq!(archive.navigations(), vec![dir.clone(), dir]);
    assert_eq!(archive.retrievals_of(&icon_eu_name(1)), 2);
    assert_eq!(archive.retrievals_of(&icon_eu_name(0)), 1);
    assert_eq!(archive.retrievals_of(&icon_eu_name(2)), 1);
}

#[tokio::test]
async fn test_connect_retried_until_success() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[0]);
    archive.fail_connects(3);

    let result = pipeline(&archive).run::<f32>(now()).await.unwrap();

    assert_eq!(result.stack.depth(), 1);
    assert_eq!(archive.connects(), 4);
}

#[tokio::test]
async fn test_listing_failure_reconnects() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[0, 1]);
    archive.fail_lists(1);

    let result = pipeline(&archive).run::<f32>(now()).await.unwrap();

    assert_eq!(result.stack.depth(), 2);
    assert_eq!(archive.lists(), 2);
    assert_eq!(archive.connects(), 2);
}

#[tokio::test]
async fn test_first_navigation_failure() {
    let archive = MockArchive::new();
    let dir = icon_eu_run(&archive, &[0]);
    archive.fail_navigations(1);

    let result = pipeline(&archive).run::<f32>(now()).await.unwrap();

    assert_eq!(result.stack.depth(), 1);
    assert_eq!(archive.connects(), 2);
    assert_eq!(archive.navigations(), vec![dir.clone(), dir]);
}

#[tokio::test]
async fn test_bounded_policy_gives_up() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[0]);
    archive.fail_retrieval(&icon_eu_name(0), 10);

    let err = pipeline(&archive)
        .with_retry_policy(RetryPolicy::fixed(Duration::ZERO).with_max_attempts(3))
        .run::<f32>(now())
        .await
        .unwrap_err();

    match err {
        PipelineError::Transport(TransportError::Exhausted {
            operation,
            attempts,
            ..
        }) => {
            assert_eq!(operation, "retrieve");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    assert_eq!(archive.retrievals_of(&icon_eu_name(0)), 3);
}

#[tokio::test]
async fn test_unknown_model_rejected_before_network() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[0]);

    let err = ForecastRequest::new("gfs", "tot_prec", 4).unwrap_err();

    assert!(matches!(err, ConfigError::UnknownModel(ref m) if m == "gfs"));
    assert_eq!(archive.connects(), 0);
}

#[tokio::test]
async fn test_teardown_failure_is_swallowed() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[0, 1]);
    archive.fail_quit();

    let result = pipeline(&archive).run::<f32>(now()).await.unwrap();

    assert_eq!(result.stack.depth(), 2);
    assert_eq!(archive.quits(), 1);
}

#[tokio::test]
async fn test_corrupt_file_is_fatal() {
    let archive = MockArchive::new();
    let dir = icon_eu_run(&archive, &[0]);
    archive.add_file(&dir, &icon_eu_name(1), b"BZh9 garbage".to_vec());

    let err = pipeline(&archive).run::<f32>(now()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Decode(_)));
    // The session is still closed
    assert_eq!(archive.quits(), 1);
}

#[tokio::test]
async fn test_incompatible_grid_is_fatal() {
    let archive = MockArchive::new();
    let dir = icon_eu_run(&archive, &[0]);
    let wider = Grib2Builder::new_regular_lat_lon()
        .with_grid(6, 4)
        .with_forecast_hour(1)
        .build_bz2();
    archive.add_file(&dir, &icon_eu_name(1), wider);

    let err = pipeline(&archive).run::<f32>(now()).await.unwrap_err();

    assert!(err
        .to_string()
        .starts_with("stack assembly failed (insufficient memory or incompatible frames)"));
    assert!(matches!(
        err,
        PipelineError::Assembly(AssemblyError::ShapeMismatch { index: 1, .. })
    ));
}

#[tokio::test]
async fn test_empty_run_directory() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[]);

    let err = pipeline(&archive).run::<f32>(now()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Assembly(AssemblyError::Empty)));
}

#[tokio::test]
async fn test_untimestamped_file_is_fatal() {
    let archive = MockArchive::new();
    let dir = icon_eu_run(&archive, &[0]);
    archive.add_file(&dir, "regular-lat-lon_readme.txt", b"hello".to_vec());

    let err = pipeline(&archive).run::<f32>(now()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Filename(_)));
    assert_eq!(archive.retrievals_of("regular-lat-lon_readme.txt"), 0);
}

#[tokio::test]
async fn test_region_clipping_applies_to_every_frame() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[0, 1, 2]);

    // Grid cells span 12.875..14.125E, 50.875..51.875N at 0.25 degrees
    let region = BoundingBox::new(13.2, 51.2, 13.3, 51.3);
    let result = pipeline(&archive)
        .with_clipper(BoundingBoxClipper::new(region, 1))
        .run::<f32>(now())
        .await
        .unwrap();

    assert_eq!(result.stack.shape(), GridShape::new(3, 3));
    assert_eq!(result.stack.frames().count(), 3);
    assert_eq!(result.footprint.len(), 9);
    assert_eq!(result.stack.transform().origin_x, 12.875);
    assert_eq!(result.stack.transform().origin_y, 51.625);
}

#[tokio::test]
async fn test_half_precision_within_tolerance() {
    let archive = MockArchive::new();
    icon_eu_run(&archive, &[3, 6]);

    let full = pipeline(&archive).run::<f32>(now()).await.unwrap();
    let half = pipeline(&archive).run::<f16>(now()).await.unwrap();

    assert_eq!(half.stack.depth(), full.stack.depth());
    for (f, h) in full.stack.frames().zip(half.stack.frames()) {
        for (&v, &h) in f.iter().zip(h) {
            let h = h.to_f32();
            if v == 0.0 {
                assert_eq!(h, 0.0);
            } else {
                assert!(((h - v) / v).abs() < 1e-3, "{} stored as {}", v, h);
            }
        }
    }
}

#[tokio::test]
async fn test_cosmo_d2_run() {
    let archive = MockArchive::new();
    let dir = "weather/nwp/cosmo-d2/grib/09/tot_prec/";
    archive.add_dir(dir);
    for lead in [0, 1, 2] {
        archive.add_file(
            dir,
            &dwd_file_name("cosmo-d2", "germany", "2023010109", lead, "TOT_PREC"),
            Grib2Builder::new_regular_lat_lon()
                .with_forecast_hour(lead)
                .with_gradient(0.0, lead as f32)
                .build_bz2(),
        );
    }

    let request = ForecastRequest::new("cosmo-d2", "tot_prec", 4).unwrap();
    let result = ForecastPipeline::new(archive.clone(), request)
        .with_retry_policy(RetryPolicy::fixed(Duration::ZERO))
        .run::<f32>(jan_first(14, 0))
        .await
        .unwrap();

    assert_eq!(result.run.run_hour, 9);
    assert_eq!(
        result.timestamps(),
        &[jan_first(9, 0), jan_first(10, 0), jan_first(11, 0)]
    );
    assert_eq!(archive.navigations(), vec![dir.to_string()]);
}
