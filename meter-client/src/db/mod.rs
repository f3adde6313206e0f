pub mod meter_queries;
