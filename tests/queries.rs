//! Catalogue query, remap and housekeeping operations.

mod common;

use common::{discovered, setup_db, utc};
use eoacquire::models::BoundingBox;
use eoacquire::repository::SceneCatalogue;
use eoacquire::sensors::SensorKind;

async fn seeded_catalogue(db: &common::TestDb) -> SceneCatalogue {
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    // Two passes on the same day, one a week later, one very cloudy.
    catalogue
        .insert_scene(&discovered("S2A_D1_AM", utc(2024, 5, 1), None))
        .await
        .unwrap();
    catalogue
        .insert_scene(&discovered("S2A_D1_PM", utc(2024, 5, 1), None))
        .await
        .unwrap();
    catalogue
        .insert_scene(&discovered("S2A_D2", utc(2024, 5, 8), None))
        .await
        .unwrap();
    let mut cloudy = discovered("S2A_CLOUDY", utc(2024, 5, 15), None);
    cloudy.cloud_cover = Some(92.0);
    catalogue.insert_scene(&cloudy).await.unwrap();
    catalogue
}

#[tokio::test]
async fn test_date_range_query_and_count() {
    let db = setup_db().await;
    let catalogue = seeded_catalogue(&db).await;

    let all = catalogue
        .query_date_range(utc(2024, 4, 1), utc(2024, 6, 1), true, None, 0, 50)
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    // Newest first.
    assert_eq!(all[0].scene_id, "S2A_CLOUDY");

    let clear = catalogue
        .query_date_range(utc(2024, 4, 1), utc(2024, 6, 1), true, Some(80.0), 0, 50)
        .await
        .unwrap();
    assert_eq!(clear.len(), 3);
    assert_eq!(
        catalogue
            .query_date_range_count(utc(2024, 4, 1), utc(2024, 6, 1), true, Some(80.0))
            .await
            .unwrap(),
        3
    );

    // Pagination.
    let page = catalogue
        .query_date_range(utc(2024, 4, 1), utc(2024, 6, 1), true, None, 1, 2)
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].scene_id, "S2A_D2");
}

#[tokio::test]
async fn test_bbox_query_excludes_disjoint_footprints() {
    let db = setup_db().await;
    let catalogue = seeded_catalogue(&db).await;

    let over_wales = BoundingBox {
        north: 53.0,
        south: 52.0,
        east: -3.0,
        west: -4.0,
    };
    let hits = catalogue
        .query_date_range_bbox(utc(2024, 4, 1), utc(2024, 6, 1), over_wales, true, 0, 50)
        .await
        .unwrap();
    assert_eq!(hits.len(), 4);

    let over_alps = BoundingBox {
        north: 47.0,
        south: 45.0,
        east: 12.0,
        west: 6.0,
    };
    let misses = catalogue
        .query_date_range_bbox(utc(2024, 4, 1), utc(2024, 6, 1), over_alps, true, 0, 50)
        .await
        .unwrap();
    assert!(misses.is_empty());
}

#[tokio::test]
async fn test_unique_dates_and_scenes_for_date() {
    let db = setup_db().await;
    let catalogue = seeded_catalogue(&db).await;

    let dates = catalogue
        .unique_dates(utc(2024, 4, 1), utc(2024, 6, 1), None)
        .await
        .unwrap();
    assert_eq!(
        dates,
        vec![
            chrono::NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 5, 8).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        ]
    );

    let day_one = catalogue
        .scenes_for_date(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(day_one.len(), 2);
    assert!(day_one.iter().all(|s| s.acquired_at.date_naive()
        == chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
}

#[tokio::test]
async fn test_remap_paths_in_place() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_MOVE", utc(2024, 5, 1), None))
        .await
        .unwrap();
    catalogue
        .mark_stage_complete(
            pid,
            eoacquire::models::Stage::Download,
            std::path::Path::new("/data/old/dl/S2A_MOVE.zip"),
            utc(2024, 5, 2),
            utc(2024, 5, 2),
        )
        .await
        .unwrap();

    let changed = catalogue
        .remap_download_paths("/data/old", "/srv/eo")
        .await
        .unwrap();
    assert_eq!(changed, 1);
    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert_eq!(
        scene.download_path,
        std::path::PathBuf::from("/srv/eo/dl/S2A_MOVE.zip")
    );

    // No ARD paths matched the prefix.
    assert_eq!(
        catalogue.remap_ard_paths("/data/old", "/srv/eo").await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_archive_marker_and_roi_pruning() {
    let db = setup_db().await;
    let catalogue = seeded_catalogue(&db).await;
    let pids = catalogue.all_pids().await.unwrap();

    catalogue.mark_archived(pids[0]).await.unwrap();
    let scene = catalogue.get_scene(pids[0]).await.unwrap().unwrap();
    assert!(scene.archived);

    // All seeded footprints are over Wales; an Alpine ROI removes them all.
    let over_alps = BoundingBox {
        north: 47.0,
        south: 45.0,
        east: 12.0,
        west: 6.0,
    };
    let removed = catalogue.remove_outside_bbox(over_alps).await.unwrap();
    assert_eq!(removed, 4);
    assert_eq!(catalogue.count().await.unwrap(), 0);
}
