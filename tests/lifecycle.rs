//! Scene lifecycle transitions across the download and ARD stages.

mod common;

use std::sync::Arc;

use common::{
    discovered, sensor_config, setup_db, utc, BrokenDownloader, FakeArd, FakeDownloader,
    RejectingArd,
};
use eoacquire::models::Stage;
use eoacquire::repository::SceneCatalogue;
use eoacquire::sensors::SensorKind;
use eoacquire::services::PipelineDriver;

fn driver(
    db: &common::TestDb,
    downloader: Arc<dyn eoacquire::adapters::SceneDownloader>,
    ard: Arc<dyn eoacquire::adapters::ArdConverter>,
) -> PipelineDriver {
    PipelineDriver::new(
        db.pool.clone(),
        sensor_config(SensorKind::Sentinel2, db.dir.path()),
        common::arc_archive(vec![]),
        downloader,
        ard,
        None,
        None,
        None,
        vec![],
        2,
    )
}

#[tokio::test]
async fn test_download_then_ard_pending_transitions() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_A", utc(2024, 3, 1), None))
        .await
        .unwrap();

    assert_eq!(catalogue.list_pending(Stage::Download).await.unwrap(), vec![pid]);
    assert!(catalogue.list_pending(Stage::ArdConvert).await.unwrap().is_empty());

    let driver = driver(&db, Arc::new(FakeDownloader), Arc::new(FakeArd));
    let counts = driver.run_stage(Stage::Download).await.unwrap();
    assert_eq!(counts.processed, 1);
    assert_eq!(counts.failed, 0);

    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(scene.downloaded);
    assert!(scene.download_path.exists());
    assert!(scene.download_end.is_some());

    // The scene moved from the download pending list to the ARD one.
    assert!(catalogue.list_pending(Stage::Download).await.unwrap().is_empty());
    assert_eq!(
        catalogue.list_pending(Stage::ArdConvert).await.unwrap(),
        vec![pid]
    );

    let counts = driver.run_stage(Stage::ArdConvert).await.unwrap();
    assert_eq!(counts.processed, 1);
    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(scene.ard_processed);
    assert!(scene.ard_path.join("bands.tif").exists());
    assert!(catalogue.list_pending(Stage::ArdConvert).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_failure_leaves_scene_pending() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_B", utc(2024, 3, 2), None))
        .await
        .unwrap();

    let driver = driver(&db, Arc::new(BrokenDownloader), Arc::new(FakeArd));
    let counts = driver.run_stage(Stage::Download).await.unwrap();
    assert_eq!(counts.processed, 0);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.invalidated, 0);

    // Row untouched, still pending for the next run.
    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(!scene.downloaded);
    assert!(!scene.invalid);
    assert_eq!(catalogue.list_pending(Stage::Download).await.unwrap(), vec![pid]);
}

#[tokio::test]
async fn test_permanent_failure_marks_scene_invalid() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_C", utc(2024, 3, 3), None))
        .await
        .unwrap();

    let driver = driver(&db, Arc::new(FakeDownloader), Arc::new(RejectingArd));
    driver.run_stage(Stage::Download).await.unwrap();
    let counts = driver.run_stage(Stage::ArdConvert).await.unwrap();
    assert_eq!(counts.invalidated, 1);

    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(scene.invalid);
    assert!(!scene.ard_processed);

    // Invalid scenes drop out of every pending list.
    for stage in [Stage::Download, Stage::ArdConvert, Stage::DatacubeLoad] {
        assert!(catalogue.list_pending(stage).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_unconfigured_stage_tool_aborts_without_invalidating() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_F", utc(2024, 3, 6), None))
        .await
        .unwrap();

    // No quicklook tool wired up, even though the sensor has the capability.
    let driver = driver(&db, Arc::new(FakeDownloader), Arc::new(FakeArd));
    driver.run_stage(Stage::Download).await.unwrap();
    driver.run_stage(Stage::ArdConvert).await.unwrap();
    assert_eq!(catalogue.list_pending(Stage::Quicklook).await.unwrap(), vec![pid]);

    let err = driver.run_stage(Stage::Quicklook).await.unwrap_err();
    assert!(err.to_string().contains("no quicklook tool configured"));

    // A missing tool is a config problem, not a scene failure: the scene
    // stays valid and pending for when the tool is configured.
    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(!scene.invalid);
    assert_eq!(catalogue.list_pending(Stage::Quicklook).await.unwrap(), vec![pid]);
}

#[tokio::test]
async fn test_reset_makes_scene_reprocessable() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_D", utc(2024, 3, 4), None))
        .await
        .unwrap();

    let driver = driver(&db, Arc::new(FakeDownloader), Arc::new(FakeArd));
    driver.run_stage(Stage::Download).await.unwrap();
    driver.run_stage(Stage::ArdConvert).await.unwrap();

    let before = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(before.ard_processed);

    catalogue.reset(pid, true, false).await.unwrap();
    let after = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(!after.downloaded);
    assert!(!after.ard_processed);
    assert!(!before.ard_path.exists());
    assert_eq!(catalogue.list_pending(Stage::Download).await.unwrap(), vec![pid]);

    // Re-running reproduces a fully processed scene.
    driver.run_stage(Stage::Download).await.unwrap();
    driver.run_stage(Stage::ArdConvert).await.unwrap();
    let redone = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(redone.downloaded && redone.ard_processed);
    assert_eq!(redone.ard_path, before.ard_path);
}

#[tokio::test]
async fn test_process_one_runs_remaining_stages() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_E", utc(2024, 3, 5), None))
        .await
        .unwrap();

    let driver = driver(&db, Arc::new(FakeDownloader), Arc::new(FakeArd));
    assert!(driver.scene_needs_processing(pid).await.unwrap());

    driver.process_one(pid).await.unwrap();
    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(scene.downloaded && scene.ard_processed);
    assert!(!driver.scene_needs_processing(pid).await.unwrap());
}
