//! Integration tests for specialist question generation


mod batch_jobs;
mod config_pipeline;
mod health_concurrency;
mod resolver_scenarios;
