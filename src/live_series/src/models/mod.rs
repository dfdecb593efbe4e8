pub mod bar;
pub mod bar_series;
pub mod instrument;
pub mod request_params;
pub mod session_params;
pub mod timeframe;
