pub mod audio_cache;
pub mod config;
pub mod dataset_writer;
pub mod dsp;
pub mod error;
pub mod features;
pub mod isolation;
pub mod noise_floor;
pub mod pipeline;
pub mod record_io;
pub mod residuals;
pub mod types;
pub mod worker_pool;
