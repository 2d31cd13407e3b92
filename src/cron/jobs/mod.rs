pub mod refresh_rolling_reports;
