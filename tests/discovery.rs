//! Discovery idempotence and duplicate resolution.

mod common;

use common::{arc_archive, discovered, sensor_config, setup_db, utc};
use eoacquire::repository::{SceneCatalogue, UsageLogRepository};
use eoacquire::sensors::SensorKind;
use eoacquire::services::DiscoveryService;

fn service(db: &common::TestDb, scenes: Vec<eoacquire::archive::DiscoveredScene>) -> DiscoveryService {
    let config = sensor_config(SensorKind::Sentinel2, db.dir.path());
    DiscoveryService::new(
        SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2),
        UsageLogRepository::new(db.pool.clone()),
        arc_archive(scenes),
        config.archive.clone(),
        config.capabilities(),
    )
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let db = setup_db().await;
    let scenes = vec![
        discovered("S2A_ONE", utc(2024, 2, 1), None),
        discovered("S2A_TWO", utc(2024, 2, 2), None),
    ];
    let service = service(&db, scenes);

    let first = service.find_new(false).await.unwrap();
    assert_eq!(first.inserted, 2);

    // Re-running from the start finds nothing new.
    let second = service.find_new(true).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.already_known, 2);

    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    assert_eq!(catalogue.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_discovery_advances_watermark() {
    let db = setup_db().await;
    let service = service(&db, vec![discovered("S2A_ONE", utc(2024, 2, 1), None)]);
    service.find_new(false).await.unwrap();

    let watermark = service.watermark(false).await.unwrap();
    assert_eq!(watermark, utc(2024, 2, 1));

    // Forcing from-start falls back to the configured floor.
    let floor = service.watermark(true).await.unwrap();
    assert!(floor < watermark);
}

#[tokio::test]
async fn test_cloud_threshold_filters_discoveries() {
    let db = setup_db().await;
    let mut cloudy = discovered("S2A_CLOUDY", utc(2024, 2, 3), None);
    cloudy.cloud_cover = Some(95.0);
    let service = service(&db, vec![cloudy, discovered("S2A_CLEAR", utc(2024, 2, 4), None)]);

    let report = service.find_new(false).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.filtered, 1);

    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let keys = catalogue.known_natural_keys().await.unwrap();
    assert!(keys.contains("S2A_CLEAR"));
    assert!(!keys.contains("S2A_CLOUDY"));
}

#[tokio::test]
async fn test_duplicate_resolution_keeps_newest_product() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);

    // Same natural key, reprocessed with a newer product date.
    let old = catalogue
        .insert_scene(&discovered(
            "S2A_DUP",
            utc(2024, 5, 20),
            Some(utc(2023, 11, 1)),
        ))
        .await
        .unwrap();
    let newer = catalogue
        .insert_scene(&discovered(
            "S2A_DUP",
            utc(2024, 5, 20),
            Some(utc(2024, 6, 1)),
        ))
        .await
        .unwrap();

    let removed = catalogue
        .resolve_duplicates(&eoacquire::repository::ClosestProductDate)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert!(catalogue.get_scene(old).await.unwrap().is_none());
    let kept = catalogue.get_scene(newer).await.unwrap().unwrap();
    assert_eq!(kept.product_date, Some(utc(2024, 6, 1)));

    // Running resolution again removes nothing.
    assert_eq!(
        catalogue
            .resolve_duplicates(&eoacquire::repository::ClosestProductDate)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_usage_log_brackets_discovery() {
    let db = setup_db().await;
    let service = service(&db, vec![discovered("S2A_ONE", utc(2024, 2, 1), None)]);
    service.find_new(false).await.unwrap();

    let usage = UsageLogRepository::new(db.pool.clone());
    let entries = usage.recent(10).await.unwrap();
    assert!(entries.iter().any(|e| e.start_block));
    assert!(entries.iter().any(|e| e.end_block && e.found_new_scenes));
}
