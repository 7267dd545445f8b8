//! Command-line driver: load a series, train an LSTM forecaster, evaluate it
//! on the held-out tail and write forecasts.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lstm_forecast::data::frame::VALUE_COLUMN;
use lstm_forecast::data::records::{load_records, records_to_frame};
use lstm_forecast::persistence::{ModelPersistence, SavedForecaster};
use lstm_forecast::{
    create_adam_trainer, ForecastConfig, GroupForecast, LSTMForecaster, ObservationTable, SeriesDataModule,
    SeriesFrame,
};

#[derive(Parser)]
#[command(name = "lstm-forecast")]
#[command(about = "Train and evaluate LSTM time-series forecasters", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wide CSV table with a timestamp column and numeric features
    #[arg(long, conflicts_with = "records", required_unless_present = "records")]
    csv: Option<PathBuf>,

    /// Name of the timestamp column (defaults to the first column)
    #[arg(long, requires = "csv")]
    timestamp_column: Option<String>,

    /// Treat every CSV column as its own series sharing one model
    #[arg(long, requires = "csv")]
    global: bool,

    /// JSON-lines file of {"start", "freq", "target"} records
    #[arg(long)]
    records: Option<PathBuf>,

    /// Skip training and forecast with a previously saved model
    #[arg(long, conflicts_with = "save")]
    load: Option<PathBuf>,

    /// Save the trained model (.json for JSON, anything else for bincode)
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write forecasts to this CSV file
    #[arg(long)]
    forecasts: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("lstm_forecast=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ForecastConfig::from_json_file(path)
            .with_context(|| format!("failed to read configuration from {}", path.display()))?,
        None => ForecastConfig::default(),
    };

    let frame = load_frame(&cli)?;
    if (cli.global || cli.records.is_some()) && config.target != VALUE_COLUMN {
        info!(from = %config.target, to = VALUE_COLUMN, "long-format input, forecasting the value column");
        config.target = VALUE_COLUMN.to_string();
    }

    let forecasts = match &cli.load {
        Some(path) => {
            let saved = SavedForecaster::load(path).with_context(|| format!("failed to load model from {}", path.display()))?;
            saved.forecast(&frame).context("forecasting with the saved model failed")?
        }
        None => train_and_forecast(frame, &config, cli.save.as_deref())?,
    };

    match &cli.forecasts {
        Some(path) => {
            write_forecasts(path, &forecasts).with_context(|| format!("failed to write forecasts to {}", path.display()))?
        }
        None => {
            for forecast in forecasts.iter().filter(|f| !f.has_target) {
                println!("group {} from t={}: {:?}", forecast.group_id, forecast.first_step, forecast.values);
            }
        }
    }

    Ok(())
}

fn load_frame(cli: &Cli) -> Result<SeriesFrame> {
    if let Some(path) = &cli.csv {
        let table = ObservationTable::from_csv_path(path, cli.timestamp_column.as_deref())
            .with_context(|| format!("failed to load {}", path.display()))?;
        return Ok(if cli.global {
            SeriesFrame::melted(table)
        } else {
            SeriesFrame::single_series(table)
        });
    }

    if let Some(path) = &cli.records {
        let records = load_records(path).with_context(|| format!("failed to load records from {}", path.display()))?;
        return records_to_frame(&records).context("failed to align records");
    }

    bail!("either --csv or --records is required")
}

fn train_and_forecast(frame: SeriesFrame, config: &ForecastConfig, save: Option<&Path>) -> Result<Vec<GroupForecast>> {
    let data = SeriesDataModule::setup(frame, config).context("failed to prepare datasets")?;

    let model = LSTMForecaster::from_config(config, data.num_features());
    info!(parameters = model.num_parameters(), features = data.num_features(), "built model");

    let mut trainer = create_adam_trainer(model, config.learning_rate).with_config(config.training_config());
    let report = trainer.fit(&data).context("training failed")?;
    info!(epochs = report.epochs_run(), reason = ?report.stop_reason, "fit finished");

    let metrics = trainer.test(&data).context("evaluation failed")?;
    println!("test mse: {:.6}, mae: {:.6} over {} windows", metrics.mse, metrics.mae, metrics.samples);

    let forecasts = trainer.predict(&data).context("prediction failed")?;

    if let Some(path) = save {
        let saved = ModelPersistence::create_saved_forecaster(
            &trainer.model,
            data.training(),
            config,
            Some(&report),
            "lstm-forecaster".to_string(),
            None,
        );
        saved.save(path).with_context(|| format!("failed to save model to {}", path.display()))?;
    }

    Ok(forecasts)
}

fn write_forecasts(path: &Path, forecasts: &[GroupForecast]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["group_id", "anchor", "time_index", "step", "value", "has_target"])?;

    for forecast in forecasts {
        for (step, value) in forecast.values.iter().enumerate() {
            writer.write_record([
                forecast.group_id.clone(),
                forecast.anchor.to_string(),
                (forecast.first_step + step).to_string(),
                (step + 1).to_string(),
                value.to_string(),
                forecast.has_target.to_string(),
            ])?;
        }
    }

    writer.flush()?;
    info!(path = %path.display(), windows = forecasts.len(), "wrote forecasts");
    Ok(())
}
