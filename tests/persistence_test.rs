use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use lstm_forecast::*;
use ndarray::Array2;
use tempfile::tempdir;

fn trained() -> (SeriesDataModule, ForecastConfig, Trainer<LSTMForecaster, MSELoss, Adam>, TrainingReport) {
    let rows = 120;
    let start = NaiveDate::from_ymd_opt(2019, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)).unwrap();
    let timestamps = (0..rows).map(|i| start + chrono::Duration::days(i as i64)).collect();
    let values = Array2::from_shape_fn((rows, 2), |(i, c)| 50.0 + 20.0 * (i as f64 * 0.3 + c as f64).sin());
    let table = ObservationTable::new(timestamps, vec!["load".to_string(), "temp".to_string()], values).unwrap();

    let config = ForecastConfig {
        target: "load".to_string(),
        n_lags: 4,
        horizon: 2,
        hidden_dim: 6,
        max_epochs: 3,
        scale_target: true,
        ..ForecastConfig::default()
    };
    let data = SeriesDataModule::setup(SeriesFrame::single_series(table), &config).unwrap();
    let mut trainer = create_adam_trainer(LSTMForecaster::from_config(&config, data.num_features()), config.learning_rate)
        .with_config(config.training_config());
    let report = trainer.fit(&data).unwrap();

    (data, config, trainer, report)
}

#[test]
fn test_binary_round_trip_gives_identical_forecasts() {
    let (data, config, trainer, report) = trained();
    let saved = ModelPersistence::create_saved_forecaster(
        &trainer.model,
        data.training(),
        &config,
        Some(&report),
        "load-forecaster".to_string(),
        Some("two features, two steps ahead".to_string()),
    );

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.bin");
    saved.save(&path).unwrap();
    let loaded = SavedForecaster::load(&path).unwrap();

    assert_eq!(loaded.model, trainer.model);
    assert_eq!(loaded.scalers, *data.training().scalers());
    assert_eq!(loaded.config, config);
    assert_eq!(loaded.metadata, saved.metadata);
    assert_eq!(loaded.metadata.total_epochs, report.epochs_run());

    let expected = trainer.predict(&data).unwrap();
    assert_eq!(loaded.forecast(data.frame()).unwrap(), expected);
}

#[test]
fn test_json_round_trip() {
    let (data, config, trainer, report) = trained();
    let saved = ModelPersistence::create_saved_forecaster(
        &trainer.model,
        data.training(),
        &config,
        Some(&report),
        "load-forecaster".to_string(),
        None,
    );

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    saved.save(&path).unwrap();
    let loaded = SavedForecaster::load(&path).unwrap();

    assert_eq!(loaded.metadata.model_name, "load-forecaster");
    assert_eq!(loaded.metadata.input_size, 2);
    assert_eq!(loaded.metadata.hidden_size, 6);
    assert_eq!(loaded.spec, *data.training().spec());

    let expected = trainer.predict(&data).unwrap();
    let actual = loaded.forecast(data.frame()).unwrap();
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_eq!((a.group_id.as_str(), a.anchor, a.has_target), (e.group_id.as_str(), e.anchor, e.has_target));
        for (x, y) in a.values.iter().zip(e.values.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = SavedForecaster::load(dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(err, ForecastError::Io(_)));
}

#[test]
fn test_load_garbage_is_serialization_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(SavedForecaster::load(&path), Err(ForecastError::Serialization(_))));
}
