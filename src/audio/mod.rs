pub mod chunk;
pub mod file;
pub mod relay;
pub mod transcoder;

pub use chunk::{Chunk, RelayItem};
pub use file::AudioFile;
pub use relay::{RelayConsumer, RelayCounters, RelayProducer};
pub use transcoder::{
    transcode_all, TerminationOutcome, TranscoderConfig, TranscoderOutput, TranscoderProcess,
};
