pub mod config;
pub mod constants;
pub mod energy;
pub mod error;
pub mod matcher;
pub mod models;
pub mod ort_bundle;
pub mod oscillator;
pub mod pipeline;
pub mod pitch;
pub mod pitch_detect;
pub mod stream_buffer;
pub mod types;
pub mod wav_io;

pub use config::{Device, PipelineConfig};
pub use error::{VcError, VcResult};
pub use matcher::StyleBank;
pub use pipeline::{ConversionPipeline, ConvertParams, SharedStatus};
pub use pitch_detect::PitchAlgorithm;
pub use stream_buffer::ConversionState;
pub use types::{FrameSequence, Waveform};
