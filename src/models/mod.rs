/// Module for LSTM network models.
pub mod lstm_network;

/// Forecasting model: LSTM stack plus linear head.
pub mod forecaster;

pub use forecaster::{LSTMForecaster, TrainableModel};
