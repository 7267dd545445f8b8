/// LSTM cell with explicit forward and backward passes.
pub mod lstm_cell;

/// Fully connected layer used as the forecasting head.
pub mod linear;
